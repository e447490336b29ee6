//! Results of semantic analysis as consumed by lowering: symbols with their
//! declared types, array specs, attributes and storage, grouped into scopes.

use hashbrown::HashSet;
use strum::Display;

use crate::{
    index::{IndexVec, simple_index},
    intern::InternedSymbol,
    middle::{ir::Location, ty::Type},
};

simple_index! {
    /// Identifies a symbol in the [`SymbolTable`]
    pub struct SymbolId;
}

simple_index! {
    /// Identifies a scope in the [`SymbolTable`]
    pub struct ScopeId;
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: IndexVec<SymbolId, Symbol>,
    scopes: IndexVec<ScopeId, Scope>,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: InternedSymbol,
    pub details: SymbolDetails,
    pub attributes: HashSet<SymbolAttribute>,
    pub flags: HashSet<SymbolFlag>,
    pub storage: Storage,
    pub location: Location,
    /// The symbol this one is associated with (use or host association)
    pub ultimate: Option<SymbolId>,
}

#[derive(Debug, Clone)]
pub enum SymbolDetails {
    Object {
        declared_type: DeclaredType,
        shape: ArraySpec,
    },
    /// Dummy procedures and procedure pointers. The interface is the already
    /// lowered function type, absent for implicit interfaces.
    Procedure { interface: Option<Type> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum IntrinsicCategory {
    Integer,
    Real,
    Logical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Intrinsic {
        category: IntrinsicCategory,
        kind: u8,
    },
    Character {
        kind: u8,
        length: CharLength,
    },
    /// `TYPE(t)` or, when polymorphic, `CLASS(t)`
    Derived {
        name: InternedSymbol,
        len_parameters: usize,
        polymorphic: bool,
    },
    /// `CLASS(*)`
    UnlimitedPolymorphic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharLength {
    Constant(i64),
    /// A specification expression that is not a constant
    Expression,
    /// `CHARACTER(*)`
    Assumed,
    /// `CHARACTER(:)`
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArraySpec {
    Scalar,
    /// `a(l1:u1, ...)`
    Explicit(Vec<ShapeSpec>),
    /// `a(l1:, ...)`, one lower bound per dimension
    AssumedShape(Vec<Bound>),
    /// `a(:, ...)` on allocatables and pointers
    Deferred(usize),
    /// `a(..)`
    AssumedRank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeSpec {
    pub lower: Bound,
    pub upper: Bound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Constant(i64),
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolAttribute {
    Allocatable,
    Pointer,
    Optional,
    Contiguous,
    Save,
    Target,
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SymbolFlag {
    /// The pointee of a legacy `POINTER (p, x)` statement
    CrayPointee,
    /// Named in an OpenMP `THREADPRIVATE` directive
    OmpThreadprivate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// Stack or dummy storage owned by the procedure
    Automatic,
    /// A named global (SAVE, module variable, DATA initialized, ...)
    Static { global: InternedSymbol },
    /// Member of a COMMON block
    Common { block: InternedSymbol, offset: u64 },
    /// Member of an EQUIVALENCE storage aggregate
    Aggregate {
        store: InternedSymbol,
        offset: u64,
        global: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub name: InternedSymbol,
    /// Variables in the order lowering instantiates them
    pub variables: Vec<ScopeVariable>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeVariable {
    Symbol(SymbolId),
    /// Storage shared by equivalenced symbols
    AggregateStore {
        name: InternedSymbol,
        size: u64,
        global: bool,
    },
}

impl ScopeVariable {
    pub fn symbol(&self) -> Option<SymbolId> {
        match self {
            ScopeVariable::Symbol(id) => Some(*id),
            ScopeVariable::AggregateStore { .. } => None,
        }
    }

    pub fn is_global_aggregate_store(&self) -> bool {
        matches!(self, ScopeVariable::AggregateStore { global: true, .. })
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        self.symbols.push(symbol)
    }

    pub fn add_scope(&mut self, scope: Scope) -> ScopeId {
        self.scopes.push(scope)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    /// Follows association links to the symbol that owns the storage
    pub fn ultimate(&self, mut id: SymbolId) -> SymbolId {
        while let Some(next) = self.symbols[id].ultimate {
            id = next;
        }
        id
    }
}

static SCALAR: ArraySpec = ArraySpec::Scalar;

impl Symbol {
    pub fn object(name: &str, declared_type: DeclaredType, shape: ArraySpec) -> Self {
        Self {
            name: InternedSymbol::new(name),
            details: SymbolDetails::Object {
                declared_type,
                shape,
            },
            attributes: HashSet::new(),
            flags: HashSet::new(),
            storage: Storage::Automatic,
            location: Location::UNKNOWN,
            ultimate: None,
        }
    }

    pub fn procedure(name: &str, interface: Option<Type>) -> Self {
        Self {
            name: InternedSymbol::new(name),
            details: SymbolDetails::Procedure { interface },
            attributes: HashSet::new(),
            flags: HashSet::new(),
            storage: Storage::Automatic,
            location: Location::UNKNOWN,
            ultimate: None,
        }
    }

    pub fn with_attribute(mut self, attribute: SymbolAttribute) -> Self {
        self.attributes.insert(attribute);
        self
    }

    pub fn with_flag(mut self, flag: SymbolFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn declared_type(&self) -> Option<&DeclaredType> {
        match &self.details {
            SymbolDetails::Object { declared_type, .. } => Some(declared_type),
            SymbolDetails::Procedure { .. } => None,
        }
    }

    pub fn array_spec(&self) -> &ArraySpec {
        match &self.details {
            SymbolDetails::Object { shape, .. } => shape,
            SymbolDetails::Procedure { .. } => &SCALAR,
        }
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self.details, SymbolDetails::Procedure { .. })
    }

    pub fn is_pointer(&self) -> bool {
        self.attributes.contains(&SymbolAttribute::Pointer)
    }

    pub fn is_allocatable(&self) -> bool {
        self.attributes.contains(&SymbolAttribute::Allocatable)
    }

    pub fn is_allocatable_or_pointer(&self) -> bool {
        !self.is_procedure() && (self.is_allocatable() || self.is_pointer())
    }

    pub fn is_optional(&self) -> bool {
        self.attributes.contains(&SymbolAttribute::Optional)
    }

    pub fn is_cray_pointee(&self) -> bool {
        self.flags.contains(&SymbolFlag::CrayPointee)
    }

    pub fn is_thread_private(&self) -> bool {
        self.flags.contains(&SymbolFlag::OmpThreadprivate)
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(
            self.declared_type(),
            Some(DeclaredType::Derived {
                polymorphic: true,
                ..
            }) | Some(DeclaredType::UnlimitedPolymorphic)
        )
    }

    pub fn is_character(&self) -> bool {
        matches!(self.declared_type(), Some(DeclaredType::Character { .. }))
    }

    pub fn is_derived_with_len_parameters(&self) -> bool {
        matches!(
            self.declared_type(),
            Some(DeclaredType::Derived { len_parameters, .. }) if *len_parameters != 0
        )
    }

    pub fn is_assumed_length_character(&self) -> bool {
        matches!(
            self.declared_type(),
            Some(DeclaredType::Character {
                length: CharLength::Assumed,
                ..
            })
        )
    }

    pub fn is_assumed_rank(&self) -> bool {
        matches!(self.array_spec(), ArraySpec::AssumedRank)
    }

    /// Whether the symbol's storage outlives any single procedure invocation
    pub fn is_global(&self) -> bool {
        match &self.storage {
            Storage::Automatic => false,
            Storage::Static { .. } | Storage::Common { .. } => true,
            Storage::Aggregate { global, .. } => *global,
        }
    }

    /// `None` for assumed-rank entities
    pub fn rank(&self) -> Option<usize> {
        match self.array_spec() {
            ArraySpec::Scalar => Some(0),
            ArraySpec::Explicit(dims) => Some(dims.len()),
            ArraySpec::AssumedShape(lower_bounds) => Some(lower_bounds.len()),
            ArraySpec::Deferred(rank) => Some(*rank),
            ArraySpec::AssumedRank => None,
        }
    }

    /// Whether a reference to the whole symbol is known to designate
    /// contiguous storage
    pub fn is_simply_contiguous(&self) -> bool {
        if self.attributes.contains(&SymbolAttribute::Contiguous) {
            return true;
        }

        match self.array_spec() {
            ArraySpec::Scalar | ArraySpec::Explicit(_) => true,
            ArraySpec::Deferred(_) => self.is_allocatable(),
            ArraySpec::AssumedShape(_) | ArraySpec::AssumedRank => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real() -> DeclaredType {
        DeclaredType::Intrinsic {
            category: IntrinsicCategory::Real,
            kind: 4,
        }
    }

    #[test]
    fn ultimate_follows_association_chain() {
        let mut table = SymbolTable::new();
        let host = table.add_symbol(Symbol::object("x", real(), ArraySpec::Scalar));

        let mut used = Symbol::object("x", real(), ArraySpec::Scalar);
        used.ultimate = Some(host);
        let used = table.add_symbol(used);

        assert_eq!(table.ultimate(used), host);
        assert_eq!(table.ultimate(host), host);
    }

    #[test]
    fn contiguity_follows_array_spec() {
        let assumed_shape =
            Symbol::object("a", real(), ArraySpec::AssumedShape(vec![Bound::Constant(1)]));
        let contiguous = assumed_shape
            .clone()
            .with_attribute(SymbolAttribute::Contiguous);
        let pointer = Symbol::object("p", real(), ArraySpec::Deferred(1))
            .with_attribute(SymbolAttribute::Pointer);

        assert!(!assumed_shape.is_simply_contiguous());
        assert!(contiguous.is_simply_contiguous());
        assert!(!pointer.is_simply_contiguous());
    }
}
