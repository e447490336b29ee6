//! Mapping from declared symbol types to IR types.

use crate::middle::{
    semantics::{
        ArraySpec, Bound, CharLength, DeclaredType, IntrinsicCategory, Symbol, SymbolDetails,
    },
    ty::{Extent, FloatKind, Type},
};

/// IR type of the entity a symbol designates (what its address points to)
pub fn gen_type(symbol: &Symbol) -> Type {
    let SymbolDetails::Object {
        declared_type,
        shape,
    } = &symbol.details
    else {
        return get_dummy_procedure_type(symbol);
    };

    let element = gen_element_type(declared_type);
    let entity = match shape {
        ArraySpec::Scalar => element,
        ArraySpec::AssumedRank => Type::assumed_rank_sequence(element),
        ArraySpec::Explicit(dims) => {
            let extents = dims
                .iter()
                .map(|dim| match (dim.lower, dim.upper) {
                    (Bound::Constant(lower), Bound::Constant(upper)) => {
                        Some((upper - lower + 1).max(0))
                    }
                    _ => None,
                })
                .collect::<Vec<Extent>>();
            Type::sequence(&extents, element)
        }
        ArraySpec::AssumedShape(lower_bounds) => {
            Type::sequence(&vec![None; lower_bounds.len()], element)
        }
        ArraySpec::Deferred(rank) => Type::sequence(&vec![None; *rank], element),
    };

    let polymorphic = symbol.is_polymorphic();
    let wrap = |inner: Type| {
        if polymorphic {
            Type::class(inner)
        } else {
            Type::boxed(inner)
        }
    };

    if symbol.is_allocatable() {
        wrap(Type::heap(entity))
    } else if symbol.is_pointer() {
        wrap(Type::pointer(entity))
    } else if polymorphic {
        Type::class(entity)
    } else {
        entity
    }
}

pub fn gen_element_type(declared_type: &DeclaredType) -> Type {
    match declared_type {
        DeclaredType::Intrinsic { category, kind } => match category {
            IntrinsicCategory::Integer => Type::integer(u32::from(*kind) * 8),
            IntrinsicCategory::Real => match kind {
                8 => Type::float(FloatKind::F64),
                _ => Type::float(FloatKind::F32),
            },
            IntrinsicCategory::Logical => Type::logical(*kind),
        },
        DeclaredType::Character { kind, length } => match length {
            CharLength::Constant(len) => Type::character(*kind, Some(*len)),
            _ => Type::character(*kind, None),
        },
        DeclaredType::Derived { name, .. } => Type::record(*name),
        DeclaredType::UnlimitedPolymorphic => Type::none(),
    }
}

/// Type of the value designating a dummy procedure or procedure pointer
/// target: a `!fir.boxproc` of its interface, `() -> ()` when implicit
pub fn get_dummy_procedure_type(symbol: &Symbol) -> Type {
    let interface = match &symbol.details {
        SymbolDetails::Procedure {
            interface: Some(interface),
        } => interface.clone(),
        _ => Type::function([], []),
    };

    Type::box_proc(interface)
}

/// Descriptor type used to hold the address of a Cray pointee
pub fn get_cray_pointee_box_type(base: Type) -> Type {
    Type::boxed(Type::pointer(base))
}

/// Kind of a character entity, `None` for non character symbols
pub fn character_kind(symbol: &Symbol) -> Option<u8> {
    match symbol.declared_type() {
        Some(DeclaredType::Character { kind, .. }) => Some(*kind),
        _ => None,
    }
}
