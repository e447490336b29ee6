//! Lowering of procedure level constructs to the IR: the services symbol
//! lowering relies on and the host association machinery of internal
//! procedures.

use crate::{
    error::LowerError,
    intern::InternedSymbol,
    lowering::extended_value::{ExtendedValue, SymMap},
    middle::{
        ir::{Location, OpKind, ValueId, builder::FirOpBuilder},
        semantics::{Symbol, SymbolId, SymbolTable},
        ty::Type,
    },
};

pub mod box_analyzer;
pub mod convert_type;
pub mod extended_value;
pub mod factory;
pub mod host_associations;
pub mod procedure;
pub mod variable;

#[derive(Debug, Clone, Default)]
pub struct LoweringOptions {
    /// Bind symbols through `hlfir.declare` operations instead of binding
    /// their values directly
    pub lower_to_high_level_fir: bool,
}

/// State shared by everything lowering the body of one function
pub struct LoweringContext<'a> {
    pub semantics: &'a SymbolTable,
    pub options: &'a LoweringOptions,
    builder: FirOpBuilder<'a>,
    location: Location,
    host_assoc_tuple: Option<ValueId>,
}

impl<'a> LoweringContext<'a> {
    pub fn new(
        semantics: &'a SymbolTable,
        options: &'a LoweringOptions,
        builder: FirOpBuilder<'a>,
    ) -> Self {
        Self {
            semantics,
            options,
            builder,
            location: Location::UNKNOWN,
            host_assoc_tuple: None,
        }
    }

    pub fn builder(&mut self) -> &mut FirOpBuilder<'a> {
        &mut self.builder
    }

    pub fn symbol(&self, id: SymbolId) -> &'a Symbol {
        self.semantics.symbol(id)
    }

    pub fn gen_type(&self, id: SymbolId) -> Type {
        convert_type::gen_type(self.symbol(id))
    }

    pub fn current_location(&self) -> Location {
        self.location
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub fn get_symbol_extended_value(
        &self,
        id: SymbolId,
        sym_map: &SymMap,
    ) -> Result<ExtendedValue, LowerError> {
        sym_map
            .lookup(id)
            .cloned()
            .ok_or_else(|| LowerError::UnboundSymbol {
                location: self.symbol(id).location,
                name: self.symbol(id).name.to_string(),
            })
    }

    /// Records the tuple value threaded to internal procedures (in a host) or
    /// received from the host (in an internal procedure)
    pub fn bind_host_assoc_tuple(&mut self, tuple: ValueId) {
        assert!(
            self.host_assoc_tuple.is_none(),
            "host association tuple bound twice"
        );
        self.host_assoc_tuple = Some(tuple);
    }

    pub fn host_assoc_tuple(&self) -> Option<ValueId> {
        self.host_assoc_tuple
    }

    /// Binds a symbol captured from the host. With high level FIR a
    /// `hlfir.declare` tagged as host associated introduces the variable.
    pub fn bind_captured_symbol(
        &mut self,
        id: SymbolId,
        value: ExtendedValue,
        sym_map: &mut SymMap,
    ) {
        let value = if self.options.lower_to_high_level_fir {
            let symbol = self.symbol(id);
            let base = value.base();
            let ty = self.builder.value_type(base);
            let declared = self.builder.create_one(
                symbol.location,
                OpKind::Declare {
                    uniq_name: symbol.name,
                    host_assoc: true,
                },
                [base],
                ty,
            );
            value.with_base(declared)
        } else {
            value
        };

        sym_map.add_symbol(id, value);
    }

    /// Calls an internal procedure, passing the host association tuple as the
    /// trailing argument when the caller has one
    pub fn gen_internal_call(
        &mut self,
        location: Location,
        callee: InternedSymbol,
        arguments: &[ValueId],
        result_types: &[Type],
    ) -> Vec<ValueId> {
        let operands = arguments
            .iter()
            .copied()
            .chain(self.host_assoc_tuple)
            .collect::<Vec<_>>();

        self.builder.create(
            location,
            OpKind::Call { callee },
            operands,
            result_types.iter().cloned(),
        )
    }
}
