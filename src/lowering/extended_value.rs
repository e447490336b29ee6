//! Values of Fortran entities together with the properties (lengths, extents,
//! lower bounds) that are not carried by their IR type, and the symbol map
//! binding symbols to them.

use hashbrown::HashMap;

use crate::middle::{ir::ValueId, semantics::SymbolId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharBoxValue {
    pub addr: ValueId,
    pub len: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayBoxValue {
    pub addr: ValueId,
    pub extents: Vec<ValueId>,
    /// Empty when every lower bound is 1
    pub lbounds: Vec<ValueId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharArrayBoxValue {
    pub addr: ValueId,
    pub len: ValueId,
    pub extents: Vec<ValueId>,
    pub lbounds: Vec<ValueId>,
}

/// An entity described by a descriptor (`!fir.box`/`!fir.class` value)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxValue {
    pub addr: ValueId,
    /// Lower bounds overriding those of the descriptor, empty if none
    pub lbounds: Vec<ValueId>,
    /// Length parameters known outside of the descriptor
    pub explicit_params: Vec<ValueId>,
}

/// An allocatable or pointer: the address of its descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableBoxValue {
    pub addr: ValueId,
    /// Length parameters that are not deferred
    pub non_deferred_params: Vec<ValueId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedValue {
    /// Scalar address (or value) with nothing more to know
    Unboxed(ValueId),
    CharBox(CharBoxValue),
    ArrayBox(ArrayBoxValue),
    CharArrayBox(CharArrayBoxValue),
    Box(BoxValue),
    MutableBox(MutableBoxValue),
    /// A `!fir.boxproc`
    ProcBox(ValueId),
}

impl ExtendedValue {
    pub fn base(&self) -> ValueId {
        match self {
            ExtendedValue::Unboxed(value) | ExtendedValue::ProcBox(value) => *value,
            ExtendedValue::CharBox(v) => v.addr,
            ExtendedValue::ArrayBox(v) => v.addr,
            ExtendedValue::CharArrayBox(v) => v.addr,
            ExtendedValue::Box(v) => v.addr,
            ExtendedValue::MutableBox(v) => v.addr,
        }
    }

    /// The same entity with its base replaced, keeping every other property
    pub fn with_base(&self, base: ValueId) -> Self {
        let mut rebased = self.clone();
        match &mut rebased {
            ExtendedValue::Unboxed(value) | ExtendedValue::ProcBox(value) => *value = base,
            ExtendedValue::CharBox(v) => v.addr = base,
            ExtendedValue::ArrayBox(v) => v.addr = base,
            ExtendedValue::CharArrayBox(v) => v.addr = base,
            ExtendedValue::Box(v) => v.addr = base,
            ExtendedValue::MutableBox(v) => v.addr = base,
        }
        rebased
    }

    pub fn lower_bounds(&self) -> &[ValueId] {
        match self {
            ExtendedValue::ArrayBox(v) => &v.lbounds,
            ExtendedValue::CharArrayBox(v) => &v.lbounds,
            ExtendedValue::Box(v) => &v.lbounds,
            _ => &[],
        }
    }

    pub fn char_box(&self) -> Option<&CharBoxValue> {
        match self {
            ExtendedValue::CharBox(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_box_value(&self) -> Option<&BoxValue> {
        match self {
            ExtendedValue::Box(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mutable_box(&self) -> Option<&MutableBoxValue> {
        match self {
            ExtendedValue::MutableBox(v) => Some(v),
            _ => None,
        }
    }
}

/// Symbols visible while lowering a procedure body, with nested scopes
#[derive(Debug)]
pub struct SymMap {
    scopes: Vec<HashMap<SymbolId, ExtendedValue>>,
}

impl Default for SymMap {
    fn default() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }
}

impl SymMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the outermost scope");
        self.scopes.pop();
    }

    /// Binds `symbol` in the innermost scope, shadowing outer bindings
    pub fn add_symbol(&mut self, symbol: SymbolId, value: ExtendedValue) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(symbol, value);
        }
    }

    pub fn lookup(&self, symbol: SymbolId) -> Option<&ExtendedValue> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&symbol))
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        self.lookup(symbol).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    #[test]
    fn inner_scopes_shadow_outer_ones() {
        let symbol = SymbolId::new(0);
        let mut map = SymMap::new();
        map.add_symbol(symbol, ExtendedValue::Unboxed(ValueId::new(1)));

        map.push_scope();
        map.add_symbol(symbol, ExtendedValue::Unboxed(ValueId::new(2)));
        assert_eq!(map.lookup(symbol).map(|v| v.base()), Some(ValueId::new(2)));

        map.pop_scope();
        assert_eq!(map.lookup(symbol).map(|v| v.base()), Some(ValueId::new(1)));
    }

    #[test]
    fn rebasing_keeps_properties() {
        let boxed = ExtendedValue::Box(BoxValue {
            addr: ValueId::new(0),
            lbounds: vec![ValueId::new(3)],
            explicit_params: vec![],
        });
        let rebased = boxed.with_base(ValueId::new(7));

        assert_eq!(rebased.base(), ValueId::new(7));
        assert_eq!(rebased.lower_bounds(), &[ValueId::new(3)]);
    }
}
