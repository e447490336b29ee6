//! Legalization of ArmSVE operations for translation to LLVM: abstract
//! operations become intrinsic forms, multi-dimensional svbool conversions are
//! unrolled, `psel` is routed through full predicates, and `create_mask` is
//! lowered to `whilelt` where possible.

use paste::paste;

use crate::{
    backend::{
        arm_sve::{SVBOOL_BASE_SIZE, SveIntrinsic, SveOp, svbool_type, verify},
        vector::{self, static_tile_offsets},
    },
    error::LegalizeError,
    middle::{
        ir::{Function, OpKind, Operation},
        rewrite::{
            ConversionTarget, MatchResult, PatternRewriter, PatternSet, RewritePattern,
            apply_partial_conversion,
        },
        ty::Type,
    },
};

/// Beats the target independent `vector.create_mask` lowering
pub const CREATE_MASK_BENEFIT: u16 = 4096;

fn expect_verified(rewriter: &PatternRewriter<'_>, op: &Operation) -> Result<(), LegalizeError> {
    verify(rewriter.function(), op)
}

/// Rewrites `op` into `intrinsic`, keeping operands, attributes and result
/// types
fn convert_one_to_one(
    op: &Operation,
    intrinsic: SveIntrinsic,
    rewriter: &mut PatternRewriter<'_>,
) -> Result<MatchResult, LegalizeError> {
    expect_verified(rewriter, op)?;
    rewriter.replace_op_with_new(op, OpKind::SveIntr(intrinsic));
    Ok(MatchResult::Applied)
}

macro_rules! one_to_one_lowerings {
    ($($op:ident),* $(,)?) => {
        paste! {
            $(
                pub struct [<$op Lowering>];

                impl RewritePattern for [<$op Lowering>] {
                    fn name(&self) -> &'static str {
                        stringify!([<$op Lowering>])
                    }

                    fn root(&self) -> &'static str {
                        SveOp::$op.into()
                    }

                    fn match_and_rewrite(
                        &self,
                        op: &Operation,
                        rewriter: &mut PatternRewriter<'_>,
                    ) -> Result<MatchResult, LegalizeError> {
                        convert_one_to_one(op, SveIntrinsic::$op, rewriter)
                    }
                }
            )*

            fn add_one_to_one_lowerings(patterns: &mut PatternSet) {
                $(patterns.add([<$op Lowering>]);)*
            }

            const ONE_TO_ONE_OPS: &[SveOp] = &[$(SveOp::$op),*];
        }
    };
}

one_to_one_lowerings! {
    Sdot,
    Smmla,
    Udot,
    Ummla,
    Usmmla,
    DupQLane,
    ScalableMaskedAddI,
    ScalableMaskedAddF,
    ScalableMaskedSubI,
    ScalableMaskedSubF,
    ScalableMaskedMulI,
    ScalableMaskedMulF,
    ScalableMaskedSDivI,
    ScalableMaskedUDivI,
    ScalableMaskedDivF,
    ZipX2,
    ZipX4,
}

/// Lowers `convert_to_svbool`/`convert_from_svbool`. The intrinsics only
/// accept 1-D predicates, so higher ranks are converted one trailing slice at
/// a time and reassembled into a zero-initialized result.
pub struct SvboolConversionOpLowering {
    op: SveOp,
    intrinsic: SveIntrinsic,
}

impl SvboolConversionOpLowering {
    pub fn convert_to_svbool() -> Self {
        Self {
            op: SveOp::ConvertToSvbool,
            intrinsic: SveIntrinsic::ConvertToSvbool,
        }
    }

    pub fn convert_from_svbool() -> Self {
        Self {
            op: SveOp::ConvertFromSvbool,
            intrinsic: SveIntrinsic::ConvertFromSvbool,
        }
    }
}

impl RewritePattern for SvboolConversionOpLowering {
    fn name(&self) -> &'static str {
        match self.op {
            SveOp::ConvertToSvbool => "ConvertToSvboolOpLowering",
            _ => "ConvertFromSvboolOpLowering",
        }
    }

    fn root(&self) -> &'static str {
        self.op.into()
    }

    fn match_and_rewrite(
        &self,
        op: &Operation,
        rewriter: &mut PatternRewriter<'_>,
    ) -> Result<MatchResult, LegalizeError> {
        expect_verified(rewriter, op)?;

        let location = op.location;
        let source = op.operands[0];
        let result_type = rewriter.value_type(op.result());
        let source_type = rewriter.value_type(source);
        let (Some(source_vector), Some(result_vector)) =
            (source_type.as_vector(), result_type.as_vector())
        else {
            unreachable!("verified svbool conversions have vector types");
        };

        let rank = source_vector.rank();
        let intrinsic = OpKind::SveIntr(self.intrinsic);

        if rank == 1 {
            let converted =
                rewriter
                    .builder()
                    .create_one(location, intrinsic, [source], result_type.clone());
            rewriter.replace_op(op, vec![converted]);
            return Ok(MatchResult::Applied);
        }

        let trailing = rank - 1;
        let mut tile = vec![1; rank];
        tile[trailing] = source_vector.dim_size(trailing);

        let slice_type = source_vector.drop_leading_dims(trailing);
        let converted_type =
            Type::vector(slice_type.with_dim_size(0, result_vector.dim_size(trailing)));

        let builder = rewriter.builder();
        let mut result = builder.create_zero_constant(location, result_type.clone());

        for index in static_tile_offsets(&source_vector.shape, &tile) {
            let position = &index[..trailing];
            let slice = vector::extract(builder, location, source, position);
            let converted =
                builder.create_one(location, intrinsic.clone(), [slice], converted_type.clone());
            result = vector::insert(builder, location, converted, result, position);
        }

        rewriter.replace_op(op, vec![result]);
        Ok(MatchResult::Applied)
    }
}

/// `psel` only exists on full predicates: widen `p1`, select, then narrow the
/// result back to the type of `p1`
pub struct PselOpLowering;

impl RewritePattern for PselOpLowering {
    fn name(&self) -> &'static str {
        "PselOpLowering"
    }

    fn root(&self) -> &'static str {
        SveOp::Psel.into()
    }

    fn match_and_rewrite(
        &self,
        op: &Operation,
        rewriter: &mut PatternRewriter<'_>,
    ) -> Result<MatchResult, LegalizeError> {
        expect_verified(rewriter, op)?;

        let location = op.location;
        let [p1, p2, index] = op.operands[..] else {
            unreachable!("verified psel has three operands");
        };
        let p1_type = rewriter.value_type(p1);

        let builder = rewriter.builder();
        let svbool = builder.create_one(
            location,
            OpKind::SveIntr(SveIntrinsic::ConvertToSvbool),
            [p1],
            svbool_type(),
        );
        let index_i32 = builder.create_one(location, OpKind::IndexCast, [index], Type::i32());
        let selected = builder.create_one(
            location,
            OpKind::SveIntr(SveIntrinsic::Psel),
            [svbool, p2, index_i32],
            svbool_type(),
        );
        let result = builder.create_one(
            location,
            OpKind::SveIntr(SveIntrinsic::ConvertFromSvbool),
            [selected],
            p1_type,
        );

        rewriter.replace_op(op, vec![result]);
        Ok(MatchResult::Applied)
    }
}

/// Lowers a 1-D scalable `vector.create_mask` whose base size is a power of
/// two in 2..=16 to `whilelt(0, bound)`
pub struct CreateMaskOpLowering;

impl RewritePattern for CreateMaskOpLowering {
    fn name(&self) -> &'static str {
        "CreateMaskOpLowering"
    }

    fn root(&self) -> &'static str {
        OpKind::VectorCreateMask.name()
    }

    fn benefit(&self) -> u16 {
        CREATE_MASK_BENEFIT
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

        if mask_vector.rank() != 1 || !mask_vector.is_scalable() {
            return Ok(rewriter.notify_match_failure("not a 1-D scalable mask"));
        }

        let base_size = mask_vector.dim_size(0);
        if !(2..=SVBOOL_BASE_SIZE).contains(&base_size) || !(base_size as u64).is_power_of_two() {
            return Ok(rewriter.notify_match_failure(format!(
                "unsupported predicate base size {base_size}"
            )));
        }

        let location = op.location;
        let builder = rewriter.builder();
        let zero = builder.create_one(location, OpKind::LlvmZero, [], Type::i64());
        let bound = vector::cast_to_i64(builder, location, op.operands[0]);
        let mask = builder.create_one(
            location,
            OpKind::SveIntr(SveIntrinsic::WhileLt),
            [zero, bound],
            mask_type.clone(),
        );

        rewriter.replace_op(op, vec![mask]);
        Ok(MatchResult::Applied)
    }
}

pub fn populate_arm_sve_legalize_for_llvm_export_patterns(patterns: &mut PatternSet) {
    add_one_to_one_lowerings(patterns);
    patterns
        .add(SvboolConversionOpLowering::convert_to_svbool())
        .add(SvboolConversionOpLowering::convert_from_svbool())
        .add(PselOpLowering)
        .add(CreateMaskOpLowering);
}

pub fn configure_arm_sve_legalize_for_export_target(target: &mut ConversionTarget) {
    target.add_legal_op(SveOp::Bfmmla.into());

    for op in ONE_TO_ONE_OPS {
        target.add_illegal_op((*op).into());
        if let Some(intrinsic) = op.intrinsic() {
            target.add_legal_op(intrinsic.into());
        }
    }

    for op in [SveOp::ConvertToSvbool, SveOp::ConvertFromSvbool, SveOp::Psel] {
        target.add_illegal_op(op.into());
    }

    for intrinsic in [
        SveIntrinsic::ConvertToSvbool,
        SveIntrinsic::ConvertFromSvbool,
        SveIntrinsic::Psel,
        SveIntrinsic::WhileLt,
    ] {
        target.add_legal_op(intrinsic.into());
    }
}

/// Runs the ArmSVE export legalization together with the target independent
/// vector lowerings
pub fn legalize_for_llvm_export(function: &mut Function) -> Result<(), LegalizeError> {
    let mut target = ConversionTarget::new();
    vector::configure_vector_to_llvm_conversion_target(&mut target);
    configure_arm_sve_legalize_for_export_target(&mut target);

    let mut patterns = PatternSet::new();
    vector::populate_vector_to_llvm_conversion_patterns(&mut patterns);
    populate_arm_sve_legalize_for_llvm_export_patterns(&mut patterns);

    log::debug!(
        "legalizing @{} for LLVM export with {} patterns",
        function.name,
        patterns.len()
    );

    apply_partial_conversion(function, &target, &patterns)
}
