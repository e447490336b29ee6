//! Host association of internal procedures.
//!
//! Variables of a host procedure that are used by its internal procedures are
//! passed to them in a tuple. The host allocates the tuple and stores a
//! reference (or descriptor) for each captured variable in it, and a pointer
//! to the tuple is passed as a trailing argument to every internal procedure,
//! which rebuilds the variables from it. Variables with static storage are not
//! captured in the tuple: internal procedures instantiate them directly.
//!
//! How a variable is captured depends on its [`CaptureKind`], decided once by
//! [`classify`] and used consistently to lay out the tuple, fill it in the
//! host and read it back in internal procedures.

use hashbrown::HashSet;
use once_cell::unsync::OnceCell;
use strum::Display;

use crate::{
    error::{LowerError, lower_todo},
    lowering::{
        LoweringContext,
        box_analyzer::ShapeAnalysis,
        extended_value::SymMap,
        variable::{AggregateStoreMap, gen_threadprivate_op, instantiate_variable},
    },
    middle::{
        ir::{Location, ValueId, builder::FirOpBuilder},
        semantics::{ScopeId, Symbol, SymbolId, SymbolTable},
        ty::Type,
    },
};

mod capture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CaptureKind {
    /// Non character scalars: the address is captured
    SimpleScalar,
    /// Dummy procedures and procedure pointers
    Procedure,
    /// Character scalars, captured as a `!fir.boxchar`
    CharacterScalar,
    /// Polymorphic scalars, captured as their `!fir.class` descriptor
    PolymorphicScalar,
    /// Allocatables, pointers and Cray pointees: the address of their
    /// descriptor is captured
    AllocatableOrPointer,
    /// Arrays of any rank, captured in a descriptor so that their lower
    /// bounds travel with them
    Array,
}

/// How a symbol is captured, together with the shape analysis the capture
/// is based on. Procedures have no shape analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub kind: CaptureKind,
    pub analysis: Option<ShapeAnalysis>,
}

/// Decides how `symbol` is captured. The result only depends on the symbol,
/// so every phase of host association agrees on the tuple layout.
pub fn classify(symbol: &Symbol) -> Result<Capture, LowerError> {
    if symbol.is_derived_with_len_parameters() {
        return Err(lower_todo!(
            symbol.location,
            "host associated derived type with length parameters"
        ));
    }

    if symbol.is_procedure() {
        return Ok(Capture {
            kind: CaptureKind::Procedure,
            analysis: None,
        });
    }

    let analysis = ShapeAnalysis::analyze(symbol);
    let kind = if symbol.is_allocatable_or_pointer() || symbol.is_cray_pointee() {
        CaptureKind::AllocatableOrPointer
    } else if analysis.is_array() {
        CaptureKind::Array
    } else if symbol.is_polymorphic() {
        CaptureKind::PolymorphicScalar
    } else if analysis.is_char() {
        CaptureKind::CharacterScalar
    } else {
        debug_assert!(analysis.is_trivial());
        CaptureKind::SimpleScalar
    };

    Ok(Capture {
        kind,
        analysis: Some(analysis),
    })
}

/// Symbols in insertion order, without duplicates
#[derive(Debug, Default)]
struct OrderedSymbolSet {
    order: Vec<SymbolId>,
    members: HashSet<SymbolId>,
}

impl OrderedSymbolSet {
    fn insert(&mut self, symbol: SymbolId) -> bool {
        let inserted = self.members.insert(symbol);
        if inserted {
            self.order.push(symbol);
        }
        inserted
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Host association state of one host procedure
#[derive(Debug, Default)]
pub struct HostAssociations {
    tuple_symbols: OrderedSymbolSet,
    /// Ultimate symbols of the captured variables with static storage
    global_symbols: HashSet<SymbolId>,
    host_scope: Option<ScopeId>,
    argument_type: OnceCell<Option<Type>>,
}

impl HostAssociations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the host variables used by internal procedures. Must be
    /// called exactly once.
    pub fn add_symbols_to_bind(
        &mut self,
        semantics: &SymbolTable,
        symbols: impl IntoIterator<Item = SymbolId>,
        host_scope: ScopeId,
    ) -> Result<(), LowerError> {
        assert!(
            self.host_scope.is_none() && self.tuple_symbols.is_empty(),
            "host associations must be populated exactly once"
        );

        let symbols = symbols.into_iter().collect::<Vec<_>>();
        if let Some(symbol) = symbols
            .iter()
            .map(|id| semantics.symbol(*id))
            .find(|symbol| symbol.is_derived_with_len_parameters())
        {
            return Err(lower_todo!(
                symbol.location,
                format!(
                    "capturing '{}' of derived type with length parameters",
                    symbol.name
                )
            ));
        }

        self.host_scope = Some(host_scope);
        for id in symbols {
            let symbol = semantics.symbol(id);
            if symbol.is_global() || symbol.is_thread_private() {
                self.global_symbols.insert(semantics.ultimate(id));
            } else {
                self.tuple_symbols.insert(id);
            }
        }

        log::debug!(
            "host associations: {} tupled, {} global",
            self.tuple_symbols.order.len(),
            self.global_symbols.len()
        );
        Ok(())
    }

    /// Whether internal procedures receive a tuple argument
    pub fn has_tuple_associations(&self) -> bool {
        !self.tuple_symbols.is_empty()
    }

    pub fn tuple_symbols(&self) -> &[SymbolId] {
        &self.tuple_symbols.order
    }

    pub fn is_global(&self, semantics: &SymbolTable, id: SymbolId) -> bool {
        self.global_symbols.contains(&semantics.ultimate(id))
    }

    /// Type of the tuple argument of internal procedures,
    /// `!fir.ref<tuple<...>>`, or `None` when nothing is tupled. Computed once.
    pub fn argument_type(&self, semantics: &SymbolTable) -> Result<Option<Type>, LowerError> {
        self.argument_type
            .get_or_try_init(|| -> Result<Option<Type>, LowerError> {
                if self.tuple_symbols.is_empty() {
                    return Ok(None);
                }

                let slots = self
                    .tuple_symbols
                    .order
                    .iter()
                    .map(|id| {
                        let symbol = semantics.symbol(*id);
                        classify(symbol).map(|capture| capture::slot_type(&capture, symbol))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let tuple = Type::tuple(slots);
                log::debug!("host association tuple: {tuple}");
                Ok(Some(Type::reference(tuple)))
            })
            .cloned()
    }

    /// Appends the tuple argument to the inputs of an internal procedure
    pub fn extend_signature(
        &self,
        semantics: &SymbolTable,
        inputs: &mut Vec<Type>,
    ) -> Result<(), LowerError> {
        if let Some(argument_type) = self.argument_type(semantics)? {
            inputs.push(argument_type);
        }
        Ok(())
    }

    /// Builds the tuple in the host procedure and records it as the trailing
    /// argument of internal procedure calls
    pub fn host_procedure_bindings(
        &self,
        ctx: &mut LoweringContext<'_>,
        sym_map: &SymMap,
    ) -> Result<(), LowerError> {
        let Some(argument_type) = self.argument_type(ctx.semantics)? else {
            return Ok(());
        };
        let tuple_type = pointee(&argument_type);
        let slots = tuple_members(&tuple_type);

        let location = ctx.current_location();
        let tuple = ctx.builder().create_alloca(location, tuple_type.clone());

        for (index, id) in self.tuple_symbols.order.iter().enumerate() {
            let symbol = ctx.symbol(*id);
            let capture = classify(symbol)?;
            let addr_in_tuple =
                gen_tuple_coor(ctx.builder(), location, &slots[index], tuple, index);
            let host_value = ctx.get_symbol_extended_value(*id, sym_map)?;

            log::trace!("capturing '{}' as {}", symbol.name, capture.kind);
            capture::instantiate_host_tuple(
                &capture,
                ctx,
                *id,
                capture::HostTupleSlot {
                    host_value,
                    addr_in_tuple,
                    location,
                },
            )?;
        }

        ctx.bind_host_assoc_tuple(tuple);
        Ok(())
    }

    /// Makes the captured variables available in an internal procedure:
    /// instantiates the global ones and rebuilds the others from the tuple
    /// argument
    pub fn internal_procedure_bindings(
        &self,
        ctx: &mut LoweringContext<'_>,
        sym_map: &mut SymMap,
    ) -> Result<(), LowerError> {
        self.instantiate_global_symbols(ctx, sym_map)?;

        let Some(argument_type) = self.argument_type(ctx.semantics)? else {
            return Ok(());
        };
        let tuple_type = pointee(&argument_type);
        let slots = tuple_members(&tuple_type);
        let location = ctx.current_location();

        let tuple = find_tuple_argument(ctx.builder(), &argument_type).ok_or_else(|| {
            LowerError::Fatal {
                location,
                message: "no host association argument found".to_string(),
            }
        })?;
        ctx.bind_host_assoc_tuple(tuple);

        for (index, id) in self.tuple_symbols.order.iter().enumerate() {
            let capture = classify(ctx.symbol(*id))?;
            let builder = ctx.builder();
            let addr_in_tuple = gen_tuple_coor(builder, location, &slots[index], tuple, index);
            let value_in_tuple = builder.create_load(location, addr_in_tuple);

            capture::get_from_tuple(
                &capture,
                ctx,
                *id,
                capture::TupleValue {
                    value_in_tuple,
                    location,
                },
                sym_map,
            )?;
        }

        Ok(())
    }

    fn instantiate_global_symbols(
        &self,
        ctx: &mut LoweringContext<'_>,
        sym_map: &mut SymMap,
    ) -> Result<(), LowerError> {
        if self.global_symbols.is_empty() {
            return Ok(());
        }

        let Some(host_scope) = self.host_scope else {
            return Ok(());
        };

        let semantics = ctx.semantics;
        let mut store_map = AggregateStoreMap::new();
        for variable in &semantics.scope(host_scope).variables {
            let captured = variable.symbol().is_some_and(|id| {
                self.global_symbols.contains(&semantics.ultimate(id))
            });
            if !captured && !variable.is_global_aggregate_store() {
                continue;
            }

            instantiate_variable(ctx, host_scope, variable, sym_map, &mut store_map)?;

            if let Some(id) = variable.symbol()
                && semantics.symbol(semantics.ultimate(id)).is_thread_private()
            {
                gen_threadprivate_op(ctx, id, sym_map)?;
            }
        }

        Ok(())
    }
}

fn pointee(argument_type: &Type) -> Type {
    argument_type
        .dyn_cast_ptr_ele_ty()
        .unwrap_or_else(|| panic!("host association argument has type {argument_type}"))
}

fn tuple_members(tuple_type: &Type) -> Vec<Type> {
    tuple_type
        .tuple_members()
        .unwrap_or_else(|| panic!("host association argument points to {tuple_type}"))
        .to_vec()
}

/// The tuple argument is the last argument of the tuple type
fn find_tuple_argument(builder: &FirOpBuilder<'_>, argument_type: &Type) -> Option<ValueId> {
    let function = builder.function();
    function
        .inputs
        .iter()
        .zip(&function.arguments)
        .rev()
        .find(|(input, _)| *input == argument_type)
        .map(|(_, argument)| *argument)
}

/// Address of slot `index` of the tuple. A reference to a reference is not
/// a valid type, so slots holding references are addressed through a
/// `!fir.llvm_ptr`.
fn gen_tuple_coor(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    slot_type: &Type,
    tuple: ValueId,
    index: usize,
) -> ValueId {
    let address_type = if slot_type.is_reference() {
        Type::llvm_pointer(slot_type.clone())
    } else {
        Type::reference(slot_type.clone())
    };

    let offset = builder.create_integer_constant(location, Type::i32(), index as i64);
    builder.create_coordinate(location, address_type, tuple, offset)
}
