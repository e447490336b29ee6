//! The three operations every capture kind implements: the type of its tuple
//! slot, storing the host value in the slot, and rebuilding the value from
//! the slot in an internal procedure.

use crate::{
    error::{LowerError, lower_todo},
    lowering::{
        LoweringContext,
        box_analyzer::ShapeAnalysis,
        convert_type::{
            character_kind, gen_type, get_cray_pointee_box_type, get_dummy_procedure_type,
        },
        extended_value::{BoxValue, ExtendedValue, MutableBoxValue, SymMap},
        factory,
        host_associations::{Capture, CaptureKind},
    },
    middle::{
        ir::{Location, ValueId, builder::FirOpBuilder},
        semantics::{Symbol, SymbolId},
        ty::{Type, TypeKind},
    },
};

/// A host value and the address of its slot in the tuple
pub(super) struct HostTupleSlot {
    pub host_value: ExtendedValue,
    pub addr_in_tuple: ValueId,
    pub location: Location,
}

/// The content of a slot, loaded in an internal procedure
pub(super) struct TupleValue {
    pub value_in_tuple: ValueId,
    pub location: Location,
}

pub(super) fn slot_type(capture: &Capture, symbol: &Symbol) -> Type {
    match capture.kind {
        CaptureKind::SimpleScalar => Type::reference(gen_type(symbol)),
        CaptureKind::Procedure => procedure::slot_type(symbol),
        CaptureKind::CharacterScalar => character::slot_type(symbol),
        CaptureKind::PolymorphicScalar => gen_type(symbol),
        CaptureKind::AllocatableOrPointer => allocatable_or_pointer::slot_type(symbol),
        CaptureKind::Array => array::slot_type(symbol),
    }
}

pub(super) fn instantiate_host_tuple(
    capture: &Capture,
    ctx: &mut LoweringContext<'_>,
    id: SymbolId,
    slot: HostTupleSlot,
) -> Result<(), LowerError> {
    let symbol = ctx.symbol(id);
    let builder = ctx.builder();

    match capture.kind {
        CaptureKind::SimpleScalar | CaptureKind::Procedure => {
            store_converted(builder, &slot, slot.host_value.base());
        }
        CaptureKind::CharacterScalar => character::instantiate_host_tuple(builder, symbol, &slot)?,
        CaptureKind::PolymorphicScalar => {
            polymorphic::instantiate_host_tuple(builder, symbol, &slot)
        }
        CaptureKind::AllocatableOrPointer => {
            allocatable_or_pointer::instantiate_host_tuple(builder, symbol, &slot)?
        }
        CaptureKind::Array => array::instantiate_host_tuple(builder, symbol, &slot),
    }

    Ok(())
}

pub(super) fn get_from_tuple(
    capture: &Capture,
    ctx: &mut LoweringContext<'_>,
    id: SymbolId,
    tuple_value: TupleValue,
    sym_map: &mut SymMap,
) -> Result<(), LowerError> {
    let symbol = ctx.symbol(id);
    let value = tuple_value.value_in_tuple;

    let bound = match capture.kind {
        CaptureKind::SimpleScalar => ExtendedValue::Unboxed(value),
        CaptureKind::Procedure if symbol.is_pointer() => ExtendedValue::Unboxed(value),
        CaptureKind::Procedure => ExtendedValue::ProcBox(value),
        CaptureKind::CharacterScalar => {
            character::get_from_tuple(ctx.builder(), tuple_value.location, value)
        }
        CaptureKind::PolymorphicScalar => {
            polymorphic::get_from_tuple(ctx.builder(), symbol, &tuple_value)
        }
        CaptureKind::AllocatableOrPointer => allocatable_or_pointer::get_from_tuple(
            ctx.builder(),
            symbol,
            analysis(capture),
            &tuple_value,
        )?,
        CaptureKind::Array => {
            array::get_from_tuple(ctx.builder(), symbol, analysis(capture), &tuple_value)
        }
    };

    ctx.bind_captured_symbol(id, bound, sym_map);
    Ok(())
}

fn analysis(capture: &Capture) -> &ShapeAnalysis {
    capture
        .analysis
        .as_ref()
        .unwrap_or_else(|| panic!("{} capture without shape analysis", capture.kind))
}

/// Type stored at a slot address
fn type_in_tuple(builder: &FirOpBuilder<'_>, addr_in_tuple: ValueId) -> Type {
    let address_type = builder.value_type(addr_in_tuple);
    address_type
        .dyn_cast_ptr_ele_ty()
        .unwrap_or_else(|| panic!("tuple slot address has non address type {address_type}"))
}

fn unexpected_host_value(symbol: &Symbol, slot: &HostTupleSlot, expected: &str) -> LowerError {
    LowerError::Fatal {
        location: slot.location,
        message: format!(
            "captured '{}' is bound to {:?} in the host, expected {expected}",
            symbol.name, slot.host_value
        ),
    }
}

fn store_converted(builder: &mut FirOpBuilder<'_>, slot: &HostTupleSlot, value: ValueId) {
    let ty = type_in_tuple(builder, slot.addr_in_tuple);
    let cast = builder.create_convert(slot.location, ty, value);
    builder.create_store(slot.location, cast, slot.addr_in_tuple);
}

/// Selects between `boxed` and an absent descriptor depending on whether
/// the address it describes is null, so that an absent optional is seen as
/// absent and not as a present descriptor of a null address
fn absent_if_null_address(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    boxed: ValueId,
) -> ValueId {
    let box_type = builder.value_type(boxed);
    let address = builder.create_box_addr(location, boxed);
    let is_present = builder.gen_is_not_null_addr(location, address);
    let absent = builder.create_absent(location, box_type);
    builder.create_select(location, is_present, boxed, absent)
}

mod procedure {
    use super::*;

    /// Procedure pointers capture the address of their `!fir.boxproc`
    pub(super) fn slot_type(symbol: &Symbol) -> Type {
        let procedure = get_dummy_procedure_type(symbol);
        if symbol.is_pointer() {
            Type::reference(procedure)
        } else {
            procedure
        }
    }
}

mod character {
    use super::*;

    pub(super) fn slot_type(symbol: &Symbol) -> Type {
        Type::box_char(character_kind(symbol).unwrap_or(1))
    }

    pub(super) fn instantiate_host_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        slot: &HostTupleSlot,
    ) -> Result<(), LowerError> {
        let char_box = slot
            .host_value
            .char_box()
            .ok_or_else(|| unexpected_host_value(symbol, slot, "a character box"))?;
        let boxchar = factory::create_embox_char(builder, slot.location, char_box);
        builder.create_store(slot.location, boxchar, slot.addr_in_tuple);
        Ok(())
    }

    pub(super) fn get_from_tuple(
        builder: &mut FirOpBuilder<'_>,
        location: Location,
        boxchar: ValueId,
    ) -> ExtendedValue {
        ExtendedValue::CharBox(factory::create_unbox_char(builder, location, boxchar))
    }
}

mod polymorphic {
    use super::*;

    pub(super) fn instantiate_host_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        slot: &HostTupleSlot,
    ) {
        let host_box = slot.host_value.base();
        if !symbol.is_optional() {
            store_converted(builder, slot, host_box);
            return;
        }

        let location = slot.location;
        let ty = type_in_tuple(builder, slot.addr_in_tuple);
        let is_present = builder.create_is_present(location, host_box);
        builder
            .gen_if_then_else(location, is_present)
            .gen_then(|builder| store_converted(builder, slot, host_box))
            .gen_else(|builder| {
                let unallocated = factory::create_unallocated_box(builder, location, ty, &[]);
                builder.create_store(location, unallocated, slot.addr_in_tuple);
            })
            .end();
    }

    pub(super) fn get_from_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        tuple_value: &TupleValue,
    ) -> ExtendedValue {
        let mut boxed = tuple_value.value_in_tuple;
        if symbol.is_optional() {
            boxed = absent_if_null_address(builder, tuple_value.location, boxed);
        }

        ExtendedValue::Box(BoxValue {
            addr: boxed,
            lbounds: Vec::new(),
            explicit_params: Vec::new(),
        })
    }
}

mod allocatable_or_pointer {
    use super::*;

    pub(super) fn slot_type(symbol: &Symbol) -> Type {
        let base = gen_type(symbol);
        if symbol.is_cray_pointee() {
            Type::reference(get_cray_pointee_box_type(base))
        } else {
            Type::reference(base)
        }
    }

    pub(super) fn instantiate_host_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        slot: &HostTupleSlot,
    ) -> Result<(), LowerError> {
        let mutable = slot
            .host_value
            .as_mutable_box()
            .ok_or_else(|| unexpected_host_value(symbol, slot, "a mutable box"))?;
        store_converted(builder, slot, mutable.addr);
        Ok(())
    }

    pub(super) fn get_from_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        analysis: &ShapeAnalysis,
        tuple_value: &TupleValue,
    ) -> Result<ExtendedValue, LowerError> {
        let location = tuple_value.location;
        let box_address = tuple_value.value_in_tuple;

        let mut non_deferred_params = Vec::new();
        if let Some(kind) = character_kind(symbol) {
            if let Some(len) = analysis.char_len_const() {
                non_deferred_params.push(builder.create_integer_constant(
                    location,
                    Type::index(),
                    len,
                ));
            } else if symbol.is_assumed_length_character() || analysis.char_len_expr() {
                let len = factory::read_char_len(builder, location, kind, box_address);
                non_deferred_params.push(len);
            }
        } else if symbol.is_derived_with_len_parameters() {
            return Err(lower_todo!(
                location,
                "host associated derived type allocatable or pointer with length parameters"
            ));
        }

        Ok(ExtendedValue::MutableBox(MutableBoxValue {
            addr: box_address,
            non_deferred_params,
        }))
    }
}

mod array {
    use super::*;

    /// Arrays are always captured in a descriptor, polymorphic ones already
    /// have one as their type
    pub(super) fn slot_type(symbol: &Symbol) -> Type {
        let ty = gen_type(symbol);
        if symbol.is_polymorphic() {
            assert!(
                matches!(ty.kind(), TypeKind::Class(_)),
                "polymorphic array has type {ty}"
            );
            ty
        } else {
            assert!(
                matches!(ty.kind(), TypeKind::Sequence { .. }),
                "array has type {ty}"
            );
            Type::boxed(ty)
        }
    }

    pub(super) fn instantiate_host_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        slot: &HostTupleSlot,
    ) {
        let location = slot.location;
        let mutable = MutableBoxValue {
            addr: slot.addr_in_tuple,
            non_deferred_params: Vec::new(),
        };

        // Bounds of an absent optional must not be read
        if let ExtendedValue::Box(host_box) = &slot.host_value
            && symbol.is_optional()
        {
            let is_present = builder.create_is_present(location, host_box.addr);
            builder
                .gen_if_then_else(location, is_present)
                .gen_then(|builder| {
                    let host_value = &slot.host_value;
                    factory::associate_mutable_box(builder, location, &mutable, host_value, &[]);
                })
                .gen_else(|builder| factory::disassociate_mutable_box(builder, location, &mutable))
                .end();
        } else {
            factory::associate_mutable_box(builder, location, &mutable, &slot.host_value, &[]);
        }
    }

    /// Whether the captured array can be used through its base address and
    /// bounds instead of its descriptor
    fn can_read_captured_box_value(symbol: &Symbol) -> bool {
        (symbol.rank() == Some(0) || symbol.is_simply_contiguous())
            && !symbol.is_polymorphic()
            && !symbol.is_derived_with_len_parameters()
            && !symbol.is_assumed_rank()
    }

    pub(super) fn get_from_tuple(
        builder: &mut FirOpBuilder<'_>,
        symbol: &Symbol,
        analysis: &ShapeAnalysis,
        tuple_value: &TupleValue,
    ) -> ExtendedValue {
        let location = tuple_value.location;
        let boxed = tuple_value.value_in_tuple;

        // The expressions of the bounds may no longer evaluate to the same
        // values, read the bounds from the descriptor unless they are constant
        let mut lbounds = Vec::new();
        if !analysis.lbound_is_all_ones() {
            match (analysis.is_static_array(), analysis.static_lbounds()) {
                (true, Some(static_lbounds)) => {
                    for lbound in static_lbounds {
                        let lbound =
                            builder.create_integer_constant(location, Type::index(), *lbound);
                        lbounds.push(lbound);
                    }
                }
                _ => {
                    for dim in 0..analysis.rank().unwrap_or(0) {
                        let dim =
                            builder.create_integer_constant(location, Type::index(), dim as i64);
                        lbounds.push(builder.create_box_dims(location, boxed, dim).0);
                    }
                }
            }
        }

        let value = BoxValue {
            addr: boxed,
            lbounds,
            explicit_params: Vec::new(),
        };

        if can_read_captured_box_value(symbol) {
            return factory::read_box_value(builder, location, &value);
        }

        if symbol.is_optional() {
            let addr = absent_if_null_address(builder, location, boxed);
            return ExtendedValue::Box(BoxValue { addr, ..value });
        }

        ExtendedValue::Box(value)
    }
}
