//! Instantiation of variables: storage for locals, addresses of globals,
//! COMMON block and EQUIVALENCE members.

use hashbrown::HashMap;

use crate::{
    error::{LowerError, lower_todo},
    intern::InternedSymbol,
    lowering::{
        LoweringContext,
        box_analyzer::ShapeAnalysis,
        convert_type::{character_kind, get_cray_pointee_box_type},
        extended_value::{
            ArrayBoxValue, CharArrayBoxValue, CharBoxValue, ExtendedValue, MutableBoxValue, SymMap,
        },
        factory,
    },
    middle::{
        ir::{OpKind, ValueId},
        semantics::{
            ArraySpec, Bound, ScopeId, ScopeVariable, Storage, SymbolAttribute, SymbolId,
        },
        ty::Type,
    },
};

/// Base addresses of the EQUIVALENCE storage aggregates instantiated so far
pub type AggregateStoreMap = HashMap<InternedSymbol, ValueId>;

/// Instantiates a variable of `scope`
pub fn instantiate_variable(
    ctx: &mut LoweringContext<'_>,
    scope: ScopeId,
    variable: &ScopeVariable,
    sym_map: &mut SymMap,
    store_map: &mut AggregateStoreMap,
) -> Result<(), LowerError> {
    match variable {
        ScopeVariable::AggregateStore { name, size, .. } => {
            instantiate_aggregate_store(ctx, *name, Some(*size), store_map);
            Ok(())
        }
        ScopeVariable::Symbol(id) => {
            let address = instantiate_storage(ctx, scope, *id, store_map)?;
            let value = bind_address(ctx, *id, address)?;

            log::trace!("instantiated '{}'", ctx.symbol(*id).name);
            sym_map.add_symbol(*id, value);
            Ok(())
        }
    }
}

fn instantiate_aggregate_store(
    ctx: &mut LoweringContext<'_>,
    name: InternedSymbol,
    size: Option<u64>,
    store_map: &mut AggregateStoreMap,
) -> ValueId {
    if let Some(address) = store_map.get(&name) {
        return *address;
    }

    let location = ctx.current_location();
    let bytes = Type::sequence(&[size.map(|s| s as i64)], Type::integer(8));
    let address = ctx.builder().create_one(
        location,
        OpKind::AddressOf { symbol: name },
        [],
        Type::reference(bytes),
    );
    store_map.insert(name, address);
    address
}

/// Name of the global holding a thread private variable that has no static
/// storage of its own
fn thread_private_global_name(scope: InternedSymbol, name: InternedSymbol) -> InternedSymbol {
    InternedSymbol::new(&format!("_QF{scope}E{name}"))
}

/// Address of the storage of a symbol: `!fir.ref<T>` where `T` is its type.
/// Cray pointees get a `!fir.ref<!fir.box<!fir.ptr<T>>>` instead, a
/// descriptor that is associated when their pointer is assigned.
fn instantiate_storage(
    ctx: &mut LoweringContext<'_>,
    scope: ScopeId,
    id: SymbolId,
    store_map: &mut AggregateStoreMap,
) -> Result<ValueId, LowerError> {
    let symbol = ctx.symbol(id);
    let ty = ctx.gen_type(id);
    let location = symbol.location;

    if symbol.is_cray_pointee() {
        let box_type = get_cray_pointee_box_type(ty);
        let builder = ctx.builder();
        let address = builder.create_alloca(location, box_type.clone());
        let null = factory::create_unallocated_box(builder, location, box_type, &[]);
        builder.create_store(location, null, address);
        return Ok(address);
    }

    let address = match &symbol.storage {
        Storage::Automatic if symbol.attributes.contains(&SymbolAttribute::Dummy) => {
            return Err(LowerError::Fatal {
                location,
                message: format!("dummy argument '{}' has no local storage", symbol.name),
            });
        }
        // Host and internal procedures must agree on the same storage
        Storage::Automatic if symbol.is_thread_private() => {
            let global = thread_private_global_name(ctx.semantics.scope(scope).name, symbol.name);
            log::debug!("thread private '{}' lives in @{global}", symbol.name);
            ctx.builder().create_one(
                location,
                OpKind::AddressOf { symbol: global },
                [],
                Type::reference(ty.clone()),
            )
        }
        Storage::Automatic => ctx.builder().create_alloca(location, ty.clone()),
        Storage::Static { global } => ctx.builder().create_one(
            location,
            OpKind::AddressOf { symbol: *global },
            [],
            Type::reference(ty.clone()),
        ),
        Storage::Common { block, offset } => {
            let bytes = Type::sequence(&[None], Type::integer(8));
            let base = ctx.builder().create_one(
                location,
                OpKind::AddressOf { symbol: *block },
                [],
                Type::reference(bytes),
            );
            member_address(ctx, base, *offset, &ty)
        }
        Storage::Aggregate { store, offset, .. } => {
            let base = instantiate_aggregate_store(ctx, *store, None, store_map);
            member_address(ctx, base, *offset, &ty)
        }
    };

    Ok(address)
}

/// Address of the member at byte `offset` of a COMMON block or aggregate
fn member_address(ctx: &mut LoweringContext<'_>, base: ValueId, offset: u64, ty: &Type) -> ValueId {
    let location = ctx.current_location();
    let builder = ctx.builder();
    let offset = builder.create_integer_constant(location, Type::index(), offset as i64);
    let byte = builder.create_coordinate(location, Type::reference(Type::integer(8)), base, offset);
    builder.create_convert(location, Type::reference(ty.clone()), byte)
}

/// Wraps the address of a variable with what is statically known of its
/// lengths and extents
pub(crate) fn bind_address(
    ctx: &mut LoweringContext<'_>,
    id: SymbolId,
    address: ValueId,
) -> Result<ExtendedValue, LowerError> {
    let symbol = ctx.symbol(id);
    let analysis = ShapeAnalysis::analyze(symbol);
    let location = symbol.location;

    if symbol.is_procedure() {
        return Ok(if symbol.is_pointer() {
            ExtendedValue::Unboxed(address)
        } else {
            ExtendedValue::ProcBox(address)
        });
    }

    if symbol.is_allocatable_or_pointer() || symbol.is_cray_pointee() {
        let non_deferred_params = match analysis.char_len_const() {
            Some(len) => vec![ctx.builder().create_integer_constant(location, Type::index(), len)],
            None => Vec::new(),
        };
        return Ok(ExtendedValue::MutableBox(MutableBoxValue {
            addr: address,
            non_deferred_params,
        }));
    }

    let len = match (character_kind(symbol), analysis.char_len_const()) {
        (None, _) => None,
        (Some(_), Some(len)) => {
            Some(ctx.builder().create_integer_constant(location, Type::index(), len))
        }
        (Some(_), None) => {
            return Err(lower_todo!(
                location,
                format!("variable '{}' with a non constant character length", symbol.name)
            ));
        }
    };

    if !analysis.is_array() {
        return Ok(match len {
            Some(len) => ExtendedValue::CharBox(CharBoxValue { addr: address, len }),
            None => ExtendedValue::Unboxed(address),
        });
    }

    let ArraySpec::Explicit(dims) = symbol.array_spec() else {
        return Err(lower_todo!(
            location,
            format!("instantiating array '{}' without an explicit shape", symbol.name)
        ));
    };
    if !analysis.is_static_array() {
        return Err(lower_todo!(
            location,
            format!("automatic array '{}'", symbol.name)
        ));
    }

    let builder = ctx.builder();
    let mut extents = Vec::with_capacity(dims.len());
    let mut lbounds = Vec::new();
    for dim in dims {
        let (Bound::Constant(lower), Bound::Constant(upper)) = (dim.lower, dim.upper) else {
            unreachable!("static arrays have constant bounds");
        };
        let extent = (upper - lower + 1).max(0);
        extents.push(builder.create_integer_constant(location, Type::index(), extent));
        if !analysis.lbound_is_all_ones() {
            lbounds.push(builder.create_integer_constant(location, Type::index(), lower));
        }
    }

    Ok(match len {
        Some(len) => ExtendedValue::CharArrayBox(CharArrayBoxValue {
            addr: address,
            len,
            extents,
            lbounds,
        }),
        None => ExtendedValue::ArrayBox(ArrayBoxValue {
            addr: address,
            extents,
            lbounds,
        }),
    })
}

/// Registers an instantiated variable as OpenMP thread private and rebinds
/// the symbol to the per-thread copy
pub fn gen_threadprivate_op(
    ctx: &mut LoweringContext<'_>,
    id: SymbolId,
    sym_map: &mut SymMap,
) -> Result<(), LowerError> {
    let value = ctx.get_symbol_extended_value(id, sym_map)?;
    let base = value.base();
    let location = ctx.symbol(id).location;

    let builder = ctx.builder();
    let ty = builder.value_type(base);
    let private = builder.create_one(location, OpKind::ThreadPrivate, [base], ty);

    sym_map.add_symbol(id, value.with_base(private));
    Ok(())
}
