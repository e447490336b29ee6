//! Descriptor manipulation helpers shared by variable instantiation and the
//! host association strategies.

use itertools::Itertools;

use crate::{
    lowering::extended_value::{
        ArrayBoxValue, BoxValue, CharArrayBoxValue, CharBoxValue, ExtendedValue, MutableBoxValue,
    },
    middle::{
        ir::{Location, OpKind, ValueId, builder::FirOpBuilder},
        ty::{Type, TypeKind},
    },
};

fn index_constant(builder: &mut FirOpBuilder<'_>, location: Location, value: i64) -> ValueId {
    builder.create_integer_constant(location, Type::index(), value)
}

/// Descriptor type stored behind a mutable box address
fn mutable_box_type(builder: &FirOpBuilder<'_>, mutable: &MutableBoxValue) -> Type {
    let address_type = builder.value_type(mutable.addr);
    address_type
        .dyn_cast_ptr_ele_ty()
        .filter(|ty| ty.is_box_like())
        .unwrap_or_else(|| panic!("mutable box address has type {address_type}"))
}

/// A descriptor of type `box_type` describing a disassociated pointer or an
/// unallocated allocatable
pub fn create_unallocated_box(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    box_type: Type,
    non_deferred_params: &[ValueId],
) -> ValueId {
    let element = box_type
        .box_element_type()
        .unwrap_or_else(|| panic!("cannot create an unallocated {box_type}"));
    let base_address_type = if element.is_ref_like() {
        element
    } else {
        Type::heap(element)
    };

    let null = builder.create_one(location, OpKind::ZeroBits, [], base_address_type);

    let mut operands = vec![null];
    if let Some(rank @ 1..) = box_type.rank() {
        let zero = index_constant(builder, location, 0);
        let shape = builder.create_one(
            location,
            OpKind::Shape,
            std::iter::repeat_n(zero, rank),
            Type::shape(rank),
        );
        operands.push(shape);
    }
    operands.extend_from_slice(non_deferred_params);

    builder.create_one(location, OpKind::Embox, operands, box_type)
}

/// Makes the mutable box point to `target`. `lbounds`, when not empty,
/// override the lower bounds of the target.
pub fn associate_mutable_box(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    mutable: &MutableBoxValue,
    target: &ExtendedValue,
    lbounds: &[ValueId],
) {
    let box_type = mutable_box_type(builder, mutable);
    let lbounds = if lbounds.is_empty() {
        target.lower_bounds()
    } else {
        lbounds
    };

    let new_box = match target {
        ExtendedValue::Box(source) => rebox(builder, location, source.addr, lbounds, box_type),
        ExtendedValue::MutableBox(source) => {
            let loaded = builder.create_load(location, source.addr);
            rebox(builder, location, loaded, lbounds, box_type)
        }
        ExtendedValue::ArrayBox(ArrayBoxValue { addr, extents, .. })
        | ExtendedValue::CharArrayBox(CharArrayBoxValue { addr, extents, .. }) => {
            let shape = if lbounds.is_empty() {
                builder.create_one(
                    location,
                    OpKind::Shape,
                    extents.iter().copied(),
                    Type::shape(extents.len()),
                )
            } else {
                builder.create_one(
                    location,
                    OpKind::ShapeShift,
                    lbounds.iter().interleave(extents.iter()).copied(),
                    Type::shape_shift(extents.len()),
                )
            };
            let mut operands = vec![*addr, shape];
            if let ExtendedValue::CharArrayBox(v) = target {
                operands.push(v.len);
            }
            builder.create_one(location, OpKind::Embox, operands, box_type)
        }
        ExtendedValue::CharBox(CharBoxValue { addr, len }) => {
            builder.create_one(location, OpKind::Embox, [*addr, *len], box_type)
        }
        ExtendedValue::Unboxed(addr) => {
            builder.create_one(location, OpKind::Embox, [*addr], box_type)
        }
        ExtendedValue::ProcBox(_) => panic!("procedures cannot be the target of a data pointer"),
    };

    builder.create_store(location, new_box, mutable.addr);
}

fn rebox(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    source: ValueId,
    lbounds: &[ValueId],
    box_type: Type,
) -> ValueId {
    let mut operands = vec![source];
    if !lbounds.is_empty() {
        let shift = builder.create_one(
            location,
            OpKind::Shift,
            lbounds.iter().copied(),
            Type::shift(lbounds.len()),
        );
        operands.push(shift);
    }

    builder.create_one(location, OpKind::Rebox, operands, box_type)
}

/// Nullifies a pointer, or marks an allocatable as unallocated
pub fn disassociate_mutable_box(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    mutable: &MutableBoxValue,
) {
    let box_type = mutable_box_type(builder, mutable);
    let null_box =
        create_unallocated_box(builder, location, box_type, &mutable.non_deferred_params);
    builder.create_store(location, null_box, mutable.addr);
}

/// Reads the address, extents and length out of a descriptor so the entity
/// can be used without it
pub fn read_box_value(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    value: &BoxValue,
) -> ExtendedValue {
    let box_type = builder.value_type(value.addr);
    let addr = builder.create_box_addr(location, value.addr);

    let len = match box_type.unwrap_element_type().kind() {
        TypeKind::Character { kind, length } => Some(match (value.explicit_params.first(), length) {
            (Some(len), _) => *len,
            (None, Some(len)) => index_constant(builder, location, *len),
            (None, None) => {
                let size =
                    builder.create_one(location, OpKind::BoxEleSize, [value.addr], Type::index());
                divide_by_kind(builder, location, size, *kind)
            }
        }),
        _ => None,
    };

    let rank = box_type.rank().unwrap_or(0);
    let extents = (0..rank)
        .map(|dim| {
            let dim = index_constant(builder, location, dim as i64);
            builder.create_box_dims(location, value.addr, dim).1
        })
        .collect::<Vec<_>>();
    let lbounds = value.lbounds.clone();

    match (rank, len) {
        (0, None) => ExtendedValue::Unboxed(addr),
        (0, Some(len)) => ExtendedValue::CharBox(CharBoxValue { addr, len }),
        (_, None) => ExtendedValue::ArrayBox(ArrayBoxValue {
            addr,
            extents,
            lbounds,
        }),
        (_, Some(len)) => ExtendedValue::CharArrayBox(CharArrayBoxValue {
            addr,
            len,
            extents,
            lbounds,
        }),
    }
}

fn divide_by_kind(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    bytes: ValueId,
    kind: u8,
) -> ValueId {
    if kind == 1 {
        return bytes;
    }

    let width = index_constant(builder, location, i64::from(kind));
    builder.create_one(location, OpKind::DivSI, [bytes, width], Type::index())
}

/// Packs a character address and length into a `!fir.boxchar`
pub fn create_embox_char(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    value: &CharBoxValue,
) -> ValueId {
    let address_type = builder.value_type(value.addr);
    let kind = match address_type.unwrap_element_type().kind() {
        TypeKind::Character { kind, .. } => *kind,
        _ => panic!("emboxchar of non character address {address_type}"),
    };

    builder.create_one(
        location,
        OpKind::EmboxChar,
        [value.addr, value.len],
        Type::box_char(kind),
    )
}

/// Splits a `!fir.boxchar` into its address and length
pub fn create_unbox_char(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    boxchar: ValueId,
) -> CharBoxValue {
    let boxchar_type = builder.value_type(boxchar);
    let TypeKind::BoxChar(kind) = *boxchar_type.kind() else {
        panic!("unboxchar of {boxchar_type}");
    };

    let results = builder.create(
        location,
        OpKind::UnboxChar,
        [boxchar],
        [Type::reference(Type::character(kind, None)), Type::index()],
    );

    CharBoxValue {
        addr: results[0],
        len: results[1],
    }
}

/// Runtime length of an assumed or deferred length character allocatable or
/// pointer, read from its descriptor
pub fn read_char_len(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    kind: u8,
    box_address: ValueId,
) -> ValueId {
    let descriptor = builder.create_load(location, box_address);
    let size = builder.create_one(location, OpKind::BoxEleSize, [descriptor], Type::index());
    divide_by_kind(builder, location, size, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{intern::InternedSymbol, middle::ir::Function};

    fn pointer_array_box() -> Type {
        Type::boxed(Type::pointer(Type::sequence(&[None], Type::i32())))
    }

    #[test]
    fn unallocated_box_has_zero_extents() {
        let mut function = Function::new(InternedSymbol::new("f"), [], []);
        let mut builder = FirOpBuilder::new(&mut function);
        create_unallocated_box(&mut builder, Location::UNKNOWN, pointer_array_box(), &[]);

        let embox = function.operations_named("fir.embox")[0];
        assert_eq!(embox.operands.len(), 2);
        assert_eq!(function.operations_named("fir.zero_bits").len(), 1);
        assert_eq!(function.operations_named("fir.shape")[0].operands.len(), 1);
    }

    #[test]
    fn association_with_lower_bounds_uses_shift() {
        let mut function = Function::new(
            InternedSymbol::new("f"),
            [
                Type::reference(pointer_array_box()),
                Type::boxed(Type::sequence(&[None], Type::i32())),
                Type::index(),
            ],
            [],
        );
        let (mutable, source, lbound) = (
            function.arguments[0],
            function.arguments[1],
            function.arguments[2],
        );
        let mut builder = FirOpBuilder::new(&mut function);

        associate_mutable_box(
            &mut builder,
            Location::UNKNOWN,
            &MutableBoxValue {
                addr: mutable,
                non_deferred_params: vec![],
            },
            &ExtendedValue::Box(BoxValue {
                addr: source,
                lbounds: vec![lbound],
                explicit_params: vec![],
            }),
            &[],
        );

        let shift = function.operations_named("fir.shift")[0];
        assert_eq!(shift.operands, [lbound]);
        let rebox = function.operations_named("fir.rebox")[0];
        assert_eq!(rebox.operands[0], source);
        let store = function.operations_named("fir.store")[0];
        assert_eq!(store.operands, [rebox.result(), mutable]);
    }
}
