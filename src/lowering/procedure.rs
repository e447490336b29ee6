//! Lowering of the entry of a procedure: its signature, the binding of its
//! dummy arguments and local variables, and host association.

use crate::{
    error::{LowerError, lower_todo},
    intern::InternedSymbol,
    lowering::{
        LoweringContext, LoweringOptions,
        convert_type::{character_kind, gen_type, get_cray_pointee_box_type},
        extended_value::{BoxValue, ExtendedValue, SymMap},
        factory,
        host_associations::HostAssociations,
        variable::{AggregateStoreMap, bind_address, instantiate_variable},
    },
    middle::{
        ir::{Function, OpKind, ValueId, builder::FirOpBuilder},
        semantics::{ArraySpec, Bound, ScopeId, Symbol, SymbolId, SymbolTable},
        ty::Type,
    },
};

#[derive(Debug, Clone)]
pub struct ProcedureDescription {
    pub name: InternedSymbol,
    pub scope: ScopeId,
    pub dummies: Vec<SymbolId>,
}

/// A lowered procedure with the bindings active at the end of its entry
pub struct LoweredProcedure {
    pub function: Function,
    pub sym_map: SymMap,
}

/// How a dummy argument is passed
pub fn dummy_argument_type(symbol: &Symbol) -> Type {
    let ty = gen_type(symbol);

    if symbol.is_procedure() {
        return if symbol.is_pointer() {
            Type::reference(ty)
        } else {
            ty
        };
    }

    if symbol.is_allocatable_or_pointer() {
        return Type::reference(ty);
    }

    if symbol.is_cray_pointee() {
        return Type::reference(get_cray_pointee_box_type(ty));
    }

    match symbol.array_spec() {
        ArraySpec::AssumedShape(_) | ArraySpec::AssumedRank if symbol.is_polymorphic() => ty,
        ArraySpec::AssumedShape(_) | ArraySpec::AssumedRank => Type::boxed(ty),
        ArraySpec::Scalar if symbol.is_polymorphic() => ty,
        ArraySpec::Scalar if symbol.is_character() => {
            Type::box_char(character_kind(symbol).unwrap_or(1))
        }
        _ => Type::reference(ty),
    }
}

fn bind_dummy(
    ctx: &mut LoweringContext<'_>,
    id: SymbolId,
    argument: ValueId,
) -> Result<ExtendedValue, LowerError> {
    let symbol = ctx.symbol(id);
    let location = symbol.location;

    if symbol.is_procedure() || symbol.is_allocatable_or_pointer() || symbol.is_cray_pointee() {
        return bind_address(ctx, id, argument);
    }

    match symbol.array_spec() {
        ArraySpec::AssumedShape(lower_bounds) => {
            let mut lbounds = Vec::new();
            if !lower_bounds.iter().all(|lb| *lb == Bound::Constant(1)) {
                for lb in lower_bounds {
                    let Bound::Constant(value) = lb else {
                        return Err(lower_todo!(
                            location,
                            format!("non constant lower bound of dummy '{}'", symbol.name)
                        ));
                    };
                    let lb = ctx.builder().create_integer_constant(location, Type::index(), *value);
                    lbounds.push(lb);
                }
            }
            Ok(ExtendedValue::Box(BoxValue {
                addr: argument,
                lbounds,
                explicit_params: Vec::new(),
            }))
        }
        ArraySpec::AssumedRank => Ok(ExtendedValue::Box(BoxValue {
            addr: argument,
            lbounds: Vec::new(),
            explicit_params: Vec::new(),
        })),
        ArraySpec::Scalar if symbol.is_polymorphic() => Ok(ExtendedValue::Box(BoxValue {
            addr: argument,
            lbounds: Vec::new(),
            explicit_params: Vec::new(),
        })),
        ArraySpec::Scalar if symbol.is_character() => Ok(ExtendedValue::CharBox(
            factory::create_unbox_char(ctx.builder(), location, argument),
        )),
        _ => bind_address(ctx, id, argument),
    }
}

fn bind_entry(
    ctx: &mut LoweringContext<'_>,
    procedure: &ProcedureDescription,
    sym_map: &mut SymMap,
) -> Result<(), LowerError> {
    let arguments = ctx.builder().function().arguments.clone();
    for (id, argument) in procedure.dummies.iter().zip(arguments) {
        let value = bind_dummy(ctx, *id, argument)?;
        sym_map.add_symbol(*id, value);
    }
    Ok(())
}

fn instantiate_locals(
    ctx: &mut LoweringContext<'_>,
    procedure: &ProcedureDescription,
    sym_map: &mut SymMap,
) -> Result<(), LowerError> {
    let semantics = ctx.semantics;
    let mut store_map = AggregateStoreMap::new();

    for variable in &semantics.scope(procedure.scope).variables {
        let already_bound = variable
            .symbol()
            .is_some_and(|id| procedure.dummies.contains(&id) || sym_map.contains(id));
        if !already_bound {
            instantiate_variable(ctx, procedure.scope, variable, sym_map, &mut store_map)?;
        }
    }
    Ok(())
}

/// Lowers the entry of a host procedure: binds its variables, builds the
/// host association tuple, then calls each of its internal procedures
pub fn lower_host_procedure(
    semantics: &SymbolTable,
    options: &LoweringOptions,
    host: &ProcedureDescription,
    internal_procedures: &[InternedSymbol],
    associations: &HostAssociations,
) -> Result<LoweredProcedure, LowerError> {
    let inputs = host
        .dummies
        .iter()
        .map(|id| dummy_argument_type(semantics.symbol(*id)))
        .collect::<Vec<_>>();
    let mut function = Function::new(host.name, inputs, []);
    let mut sym_map = SymMap::new();

    {
        let mut ctx = LoweringContext::new(semantics, options, FirOpBuilder::new(&mut function));
        bind_entry(&mut ctx, host, &mut sym_map)?;
        instantiate_locals(&mut ctx, host, &mut sym_map)?;
        associations.host_procedure_bindings(&mut ctx, &sym_map)?;

        let location = ctx.current_location();
        for callee in internal_procedures {
            ctx.gen_internal_call(location, *callee, &[], &[]);
        }
        ctx.builder().create(location, OpKind::Return, [], []);
    }

    log::debug!("lowered host procedure @{}", function.name);
    Ok(LoweredProcedure { function, sym_map })
}

/// Lowers the entry of an internal procedure of a host whose associations
/// are `associations`
pub fn lower_internal_procedure(
    semantics: &SymbolTable,
    options: &LoweringOptions,
    internal: &ProcedureDescription,
    associations: &HostAssociations,
) -> Result<LoweredProcedure, LowerError> {
    let mut inputs = internal
        .dummies
        .iter()
        .map(|id| dummy_argument_type(semantics.symbol(*id)))
        .collect::<Vec<_>>();
    associations.extend_signature(semantics, &mut inputs)?;

    let mut function = Function::new(internal.name, inputs, []);
    let mut sym_map = SymMap::new();

    {
        let mut ctx = LoweringContext::new(semantics, options, FirOpBuilder::new(&mut function));
        bind_entry(&mut ctx, internal, &mut sym_map)?;
        associations.internal_procedure_bindings(&mut ctx, &mut sym_map)?;
        instantiate_locals(&mut ctx, internal, &mut sym_map)?;

        let location = ctx.current_location();
        ctx.builder().create(location, OpKind::Return, [], []);
    }

    log::debug!("lowered internal procedure @{}", function.name);
    Ok(LoweredProcedure { function, sym_map })
}
