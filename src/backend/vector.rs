//! Vector dialect helpers shared by the target specific legalizations, and
//! the target independent lowering of `vector.create_mask`.

use itertools::Itertools;

use crate::{
    backend::arm_sve::get_i1_same_shape,
    error::LegalizeError,
    middle::{
        ir::{CmpIPredicate, Location, OpKind, Operation, ValueId, builder::FirOpBuilder},
        rewrite::{ConversionTarget, MatchResult, PatternRewriter, PatternSet, RewritePattern},
        ty::{Type, TypeKind, VectorType},
    },
};

pub fn create_mask(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    bound: ValueId,
    mask_type: VectorType,
) -> ValueId {
    builder.create_one(
        location,
        OpKind::VectorCreateMask,
        [bound],
        Type::vector(mask_type),
    )
}

/// Extracts the sub-vector at `position`, dropping one leading dimension per
/// position entry
pub fn extract(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    source: ValueId,
    position: &[i64],
) -> ValueId {
    let source_type = builder.value_type(source);
    let vector = source_type
        .as_vector()
        .unwrap_or_else(|| panic!("vector.extract from non vector {source_type}"));
    let result_type = Type::vector(vector.drop_leading_dims(position.len()));

    builder.create_one(
        location,
        OpKind::VectorExtract {
            position: position.into(),
        },
        [source],
        result_type,
    )
}

/// Inserts `value` into `destination` at `position`, producing the updated
/// vector
pub fn insert(
    builder: &mut FirOpBuilder<'_>,
    location: Location,
    value: ValueId,
    destination: ValueId,
    position: &[i64],
) -> ValueId {
    let result_type = builder.value_type(destination);

    builder.create_one(
        location,
        OpKind::VectorInsert {
            position: position.into(),
        },
        [value, destination],
        result_type,
    )
}

/// Offsets of every tile of shape `tile` covering `shape`, in row-major order.
/// `tile` must have the rank of `shape`.
pub fn static_tile_offsets(shape: &[i64], tile: &[i64]) -> Vec<Vec<i64>> {
    assert_eq!(shape.len(), tile.len(), "tile rank must match the shape");

    if shape.is_empty() {
        return vec![Vec::new()];
    }

    shape
        .iter()
        .zip(tile)
        .map(|(&extent, &step)| {
            assert!(step > 0, "tile sizes must be positive");
            (0..extent).step_by(step as usize)
        })
        .multi_cartesian_product()
        .collect()
}

/// Target independent lowering of a 1-D `vector.create_mask`:
/// `step < broadcast(bound)`
pub struct CreateMaskStepCompareLowering;

impl RewritePattern for CreateMaskStepCompareLowering {
    fn name(&self) -> &'static str {
        "CreateMaskStepCompareLowering"
    }

    fn root(&self) -> &'static str {
        OpKind::VectorCreateMask.name()
    }

    fn match_and_rewrite(
        &self,
        op: &Operation,
        rewriter: &mut PatternRewriter<'_>,
    ) -> Result<MatchResult, LegalizeError> {
        let mask_type = rewriter.value_type(op.result());
        let Some(mask_vector) = mask_type.as_vector() else {
            return Ok(rewriter.notify_match_failure("result is not a vector"));
        };
        if mask_vector.rank() != 1 {
            return Ok(rewriter.notify_match_failure("only 1-D masks are supported"));
        }

        let location = op.location;
        let [bound] = op.operands[..] else {
            return Err(LegalizeError::MalformedOperation {
                operation: op.name().to_string(),
                location,
                message: "expected a single bound operand".to_string(),
            });
        };

        let step_type = mask_vector.with_element(Type::i64());
        let builder = rewriter.builder();
        let bound = cast_to_i64(builder, location, bound);
        let step = builder.create_one(
            location,
            OpKind::VectorStep,
            [],
            Type::vector(step_type.clone()),
        );
        let splat = builder.create_one(
            location,
            OpKind::VectorBroadcast,
            [bound],
            Type::vector(step_type.clone()),
        );
        let mask = builder.create_one(
            location,
            OpKind::CmpI(CmpIPredicate::Slt),
            [step, splat],
            get_i1_same_shape(&Type::vector(step_type)).unwrap_or(mask_type.clone()),
        );

        rewriter.replace_op(op, vec![mask]);
        Ok(MatchResult::Applied)
    }
}

/// Casts an `index` or narrower integer to `i64`
pub fn cast_to_i64(builder: &mut FirOpBuilder<'_>, location: Location, value: ValueId) -> ValueId {
    match builder.value_type(value).kind() {
        TypeKind::Integer(64) => value,
        _ => builder.create_one(location, OpKind::IndexCast, [value], Type::i64()),
    }
}

pub fn populate_vector_to_llvm_conversion_patterns(patterns: &mut PatternSet) {
    patterns.add(CreateMaskStepCompareLowering);
}

/// Vector operations that have no LLVM counterpart and must be lowered
pub fn configure_vector_to_llvm_conversion_target(target: &mut ConversionTarget) {
    target.add_illegal_op(OpKind::VectorCreateMask.name());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_offsets_cover_leading_dimensions() {
        assert_eq!(
            static_tile_offsets(&[2, 3, 4], &[1, 1, 4]),
            vec![
                vec![0, 0, 0],
                vec![0, 1, 0],
                vec![0, 2, 0],
                vec![1, 0, 0],
                vec![1, 1, 0],
                vec![1, 2, 0],
            ]
        );
        assert_eq!(static_tile_offsets(&[8], &[8]), vec![vec![0]]);
    }
}
