//! The ArmSVE dialect: abstract scalable vector operations and the
//! intrinsic forms they are legalized to before translation to LLVM.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::LegalizeError,
    middle::{
        ir::{Attribute, Function, Location, OpKind, Operation, ValueId, builder::FirOpBuilder},
        ty::{Type, TypeKind, VectorType},
    },
};

pub mod legalize;

/// Base element count of a full SVE predicate (`svbool_t`)
pub const SVBOOL_BASE_SIZE: i64 = 16;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum SveOp {
    #[strum(serialize = "arm_sve.sdot")]
    Sdot,
    #[strum(serialize = "arm_sve.smmla")]
    Smmla,
    #[strum(serialize = "arm_sve.udot")]
    Udot,
    #[strum(serialize = "arm_sve.ummla")]
    Ummla,
    #[strum(serialize = "arm_sve.usmmla")]
    Usmmla,
    /// Already in a form LLVM translation accepts
    #[strum(serialize = "arm_sve.bfmmla")]
    Bfmmla,
    #[strum(serialize = "arm_sve.dupq_lane")]
    DupQLane,
    #[strum(serialize = "arm_sve.masked.addi")]
    ScalableMaskedAddI,
    #[strum(serialize = "arm_sve.masked.addf")]
    ScalableMaskedAddF,
    #[strum(serialize = "arm_sve.masked.subi")]
    ScalableMaskedSubI,
    #[strum(serialize = "arm_sve.masked.subf")]
    ScalableMaskedSubF,
    #[strum(serialize = "arm_sve.masked.muli")]
    ScalableMaskedMulI,
    #[strum(serialize = "arm_sve.masked.mulf")]
    ScalableMaskedMulF,
    #[strum(serialize = "arm_sve.masked.divi_signed")]
    ScalableMaskedSDivI,
    #[strum(serialize = "arm_sve.masked.divi_unsigned")]
    ScalableMaskedUDivI,
    #[strum(serialize = "arm_sve.masked.divf")]
    ScalableMaskedDivF,
    #[strum(serialize = "arm_sve.zip.x2")]
    ZipX2,
    #[strum(serialize = "arm_sve.zip.x4")]
    ZipX4,
    #[strum(serialize = "arm_sve.convert_to_svbool")]
    ConvertToSvbool,
    #[strum(serialize = "arm_sve.convert_from_svbool")]
    ConvertFromSvbool,
    #[strum(serialize = "arm_sve.psel")]
    Psel,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum SveIntrinsic {
    #[strum(serialize = "arm_sve.intr.sdot")]
    Sdot,
    #[strum(serialize = "arm_sve.intr.smmla")]
    Smmla,
    #[strum(serialize = "arm_sve.intr.udot")]
    Udot,
    #[strum(serialize = "arm_sve.intr.ummla")]
    Ummla,
    #[strum(serialize = "arm_sve.intr.usmmla")]
    Usmmla,
    #[strum(serialize = "arm_sve.intr.dupq_lane")]
    DupQLane,
    #[strum(serialize = "arm_sve.intr.add")]
    ScalableMaskedAddI,
    #[strum(serialize = "arm_sve.intr.fadd")]
    ScalableMaskedAddF,
    #[strum(serialize = "arm_sve.intr.sub")]
    ScalableMaskedSubI,
    #[strum(serialize = "arm_sve.intr.fsub")]
    ScalableMaskedSubF,
    #[strum(serialize = "arm_sve.intr.mul")]
    ScalableMaskedMulI,
    #[strum(serialize = "arm_sve.intr.fmul")]
    ScalableMaskedMulF,
    #[strum(serialize = "arm_sve.intr.sdiv")]
    ScalableMaskedSDivI,
    #[strum(serialize = "arm_sve.intr.udiv")]
    ScalableMaskedUDivI,
    #[strum(serialize = "arm_sve.intr.fdiv")]
    ScalableMaskedDivF,
    #[strum(serialize = "arm_sve.intr.zip.x2")]
    ZipX2,
    #[strum(serialize = "arm_sve.intr.zip.x4")]
    ZipX4,
    #[strum(serialize = "arm_sve.intr.convert.to.svbool")]
    ConvertToSvbool,
    #[strum(serialize = "arm_sve.intr.convert.from.svbool")]
    ConvertFromSvbool,
    #[strum(serialize = "arm_sve.intr.psel")]
    Psel,
    #[strum(serialize = "arm_sve.intr.whilelt")]
    WhileLt,
}

impl SveOp {
    /// The intrinsic the op is rewritten to, `None` for ops that are legal
    /// as they are
    pub fn intrinsic(self) -> Option<SveIntrinsic> {
        match self {
            SveOp::Sdot => Some(SveIntrinsic::Sdot),
            SveOp::Smmla => Some(SveIntrinsic::Smmla),
            SveOp::Udot => Some(SveIntrinsic::Udot),
            SveOp::Ummla => Some(SveIntrinsic::Ummla),
            SveOp::Usmmla => Some(SveIntrinsic::Usmmla),
            SveOp::DupQLane => Some(SveIntrinsic::DupQLane),
            SveOp::ScalableMaskedAddI => Some(SveIntrinsic::ScalableMaskedAddI),
            SveOp::ScalableMaskedAddF => Some(SveIntrinsic::ScalableMaskedAddF),
            SveOp::ScalableMaskedSubI => Some(SveIntrinsic::ScalableMaskedSubI),
            SveOp::ScalableMaskedSubF => Some(SveIntrinsic::ScalableMaskedSubF),
            SveOp::ScalableMaskedMulI => Some(SveIntrinsic::ScalableMaskedMulI),
            SveOp::ScalableMaskedMulF => Some(SveIntrinsic::ScalableMaskedMulF),
            SveOp::ScalableMaskedSDivI => Some(SveIntrinsic::ScalableMaskedSDivI),
            SveOp::ScalableMaskedUDivI => Some(SveIntrinsic::ScalableMaskedUDivI),
            SveOp::ScalableMaskedDivF => Some(SveIntrinsic::ScalableMaskedDivF),
            SveOp::ZipX2 => Some(SveIntrinsic::ZipX2),
            SveOp::ZipX4 => Some(SveIntrinsic::ZipX4),
            SveOp::ConvertToSvbool => Some(SveIntrinsic::ConvertToSvbool),
            SveOp::ConvertFromSvbool => Some(SveIntrinsic::ConvertFromSvbool),
            SveOp::Psel => Some(SveIntrinsic::Psel),
            SveOp::Bfmmla => None,
        }
    }

    /// Number of results produced by the operation
    pub fn result_count(self) -> usize {
        match self {
            SveOp::ZipX2 => 2,
            SveOp::ZipX4 => 4,
            _ => 1,
        }
    }
}

/// Returns the vector of the same shape (and scalability) containing `i1`
pub fn get_i1_same_shape(ty: &Type) -> Option<Type> {
    ty.as_vector()
        .map(|vector| Type::vector(vector.with_element(Type::i1())))
}

/// The `svbool` type of a predicate: same leading dimensions, trailing
/// dimension widened to a full predicate
pub fn svbool_type_like(predicate: &VectorType) -> VectorType {
    predicate.with_dim_size(predicate.rank() - 1, SVBOOL_BASE_SIZE)
}

/// `vector<[16]xi1>`
pub fn svbool_type() -> Type {
    Type::vector(VectorType::new(&[SVBOOL_BASE_SIZE], &[true], Type::i1()))
}

fn as_scalable_predicate(ty: &Type) -> Option<&VectorType> {
    ty.as_vector().filter(|vector| {
        vector.rank() >= 1
            && vector.scalable_dims[vector.rank() - 1]
            && *vector.element.kind() == TypeKind::Integer(1)
    })
}

/// Checks the operand and result types of an ArmSVE operation
pub fn verify(function: &Function, operation: &Operation) -> Result<(), LegalizeError> {
    let OpKind::Sve(op) = operation.kind else {
        return Ok(());
    };

    let malformed = |message: &str| LegalizeError::MalformedOperation {
        operation: op.to_string(),
        location: operation.location,
        message: message.to_string(),
    };

    if operation.results.len() != op.result_count() {
        return Err(malformed("unexpected number of results"));
    }

    match op {
        SveOp::ConvertToSvbool | SveOp::ConvertFromSvbool => {
            let [source] = operation.operands[..] else {
                return Err(malformed("expected exactly one operand"));
            };
            let (Some(source_vector), Some(result_vector)) = (
                as_scalable_predicate(function.value_type(source)),
                as_scalable_predicate(function.value_type(operation.result())),
            ) else {
                return Err(malformed("operands must be scalable predicates"));
            };

            if source_vector.rank() != result_vector.rank()
                || source_vector.shape[..source_vector.rank() - 1]
                    != result_vector.shape[..result_vector.rank() - 1]
            {
                return Err(malformed("leading dimensions of source and result differ"));
            }
        }
        SveOp::Psel => {
            if operation.operands.len() != 3 {
                return Err(malformed("expected p1, p2 and an index"));
            }
            if *function.value_type(operation.operands[2]).kind() != TypeKind::Index {
                return Err(malformed("the lane index must be of index type"));
            }
        }
        _ => {}
    }

    Ok(())
}

/* Operation constructors */

pub fn sve_op(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    op: SveOp,
    operands: &[ValueId],
    result_type: Type,
) -> Vec<ValueId> {
    builder.create(
        location,
        OpKind::Sve(op),
        operands.iter().copied(),
        std::iter::repeat_n(result_type, op.result_count()),
    )
}

/// `arm_sve.sdot`/`udot`/`smmla`/...: the result has the accumulator's type
pub fn dot_like(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    op: SveOp,
    accumulator: ValueId,
    lhs: ValueId,
    rhs: ValueId,
) -> ValueId {
    let ty = builder.value_type(accumulator);
    sve_op(builder, location, op, &[accumulator, lhs, rhs], ty)[0]
}

pub fn masked_binary(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    op: SveOp,
    mask: ValueId,
    lhs: ValueId,
    rhs: ValueId,
) -> ValueId {
    let ty = builder.value_type(lhs);
    sve_op(builder, location, op, &[mask, lhs, rhs], ty)[0]
}

pub fn dupq_lane(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    source: ValueId,
    lane: i64,
) -> ValueId {
    let ty = builder.value_type(source);
    builder.create_with_attributes(
        location,
        OpKind::Sve(SveOp::DupQLane),
        [source],
        [ty],
        [("lane", Attribute::Int(lane))],
    )[0]
}

pub fn convert_to_svbool(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    source: ValueId,
) -> ValueId {
    let source_type = builder.value_type(source);
    let vector = source_type
        .as_vector()
        .unwrap_or_else(|| panic!("convert_to_svbool source must be a vector, got {source_type}"));
    let result_type = Type::vector(svbool_type_like(vector));

    sve_op(builder, location, SveOp::ConvertToSvbool, &[source], result_type)[0]
}

pub fn convert_from_svbool(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    source: ValueId,
    result_type: Type,
) -> ValueId {
    sve_op(builder, location, SveOp::ConvertFromSvbool, &[source], result_type)[0]
}

pub fn psel(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    p1: ValueId,
    p2: ValueId,
    index: ValueId,
) -> ValueId {
    let ty = builder.value_type(p1);
    sve_op(builder, location, SveOp::Psel, &[p1, p2, index], ty)[0]
}

pub fn zip(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    operands: &[ValueId],
) -> Vec<ValueId> {
    let op = match operands.len() {
        2 => SveOp::ZipX2,
        4 => SveOp::ZipX4,
        n => panic!("zip takes 2 or 4 operands, got {n}"),
    };
    let ty = builder.value_type(operands[0]);
    sve_op(builder, location, op, operands, ty)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn op_names_round_trip_through_strum() {
        for op in SveOp::iter() {
            let name: &'static str = op.into();
            assert_eq!(SveOp::from_str(name).unwrap(), op);
            assert!(name.starts_with("arm_sve."));
        }
    }

    #[test]
    fn only_bfmmla_has_no_intrinsic() {
        let without = SveOp::iter()
            .filter(|op| op.intrinsic().is_none())
            .collect::<Vec<_>>();
        assert_eq!(without, [SveOp::Bfmmla]);
        assert_eq!(SveOp::Psel.intrinsic(), Some(SveIntrinsic::Psel));
    }

    #[test]
    fn i1_same_shape_keeps_scalability() {
        let ty = Type::vector(VectorType::new(&[2, 4], &[false, true], Type::i32()));

        assert_eq!(
            get_i1_same_shape(&ty).unwrap().to_string(),
            "vector<2x[4]xi1>"
        );
        assert_eq!(get_i1_same_shape(&Type::i32()), None);
    }
}
