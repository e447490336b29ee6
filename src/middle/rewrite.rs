//! Pattern-based partial conversion. Patterns are grouped in a [`PatternSet`]
//! and applied to every operation a [`ConversionTarget`] does not declare
//! legal. Replacement operations are spliced in place of the original one and
//! uses of the old results are redirected to the replacement values.

use hashbrown::{HashMap, HashSet};

use crate::{
    error::LegalizeError,
    middle::{
        ir::{Block, Function, OpKind, Operation, ValueId, builder::FirOpBuilder},
        ty::Type,
    },
};

/// Replacement operations are themselves legalized, up to this depth
const MAX_REWRITE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Applied,
    NotApplicable(String),
}

pub trait RewritePattern {
    /// Used in logs
    fn name(&self) -> &'static str;

    /// Name of the operation this pattern rewrites
    fn root(&self) -> &'static str;

    fn benefit(&self) -> u16 {
        1
    }

    /// Either rewrites `op` through the rewriter (ending with
    /// [`PatternRewriter::replace_op`]) and returns [`MatchResult::Applied`],
    /// or returns [`MatchResult::NotApplicable`] without creating anything.
    fn match_and_rewrite(
        &self,
        op: &Operation,
        rewriter: &mut PatternRewriter<'_>,
    ) -> Result<MatchResult, LegalizeError>;
}

#[derive(Default)]
pub struct PatternSet {
    patterns: Vec<Box<dyn RewritePattern>>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: impl RewritePattern + 'static) -> &mut Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.name() == name)
    }

    /// Patterns rooted at `op_name`, highest benefit first. Patterns of equal
    /// benefit keep their registration order.
    pub fn candidates(&self, op_name: &str) -> Vec<&dyn RewritePattern> {
        let mut candidates = self
            .patterns
            .iter()
            .filter(|p| p.root() == op_name)
            .map(|p| p.as_ref())
            .collect::<Vec<_>>();

        candidates.sort_by_key(|p| std::cmp::Reverse(p.benefit()));
        candidates
    }
}

/// Which operations must not survive a conversion
#[derive(Debug, Default, Clone)]
pub struct ConversionTarget {
    legal: HashSet<&'static str>,
    illegal: HashSet<&'static str>,
}

impl ConversionTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_legal_op(&mut self, name: &'static str) -> &mut Self {
        self.illegal.remove(name);
        self.legal.insert(name);
        self
    }

    pub fn add_illegal_op(&mut self, name: &'static str) -> &mut Self {
        self.legal.remove(name);
        self.illegal.insert(name);
        self
    }

    pub fn is_legal(&self, name: &str) -> bool {
        self.legal.contains(name)
    }

    pub fn is_illegal(&self, name: &str) -> bool {
        self.illegal.contains(name)
    }
}

/// Handed to a pattern while it rewrites one operation. Operations created
/// through [`PatternRewriter::builder`] are buffered and only spliced into
/// the function if the pattern reports [`MatchResult::Applied`].
pub struct PatternRewriter<'f> {
    builder: FirOpBuilder<'f>,
    replacement: Option<Vec<ValueId>>,
}

impl<'f> PatternRewriter<'f> {
    fn new(function: &'f mut Function) -> Self {
        let mut builder = FirOpBuilder::new(function);
        builder.push_region();

        Self {
            builder,
            replacement: None,
        }
    }

    pub fn builder(&mut self) -> &mut FirOpBuilder<'f> {
        &mut self.builder
    }

    pub fn function(&self) -> &Function {
        self.builder.function()
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        self.builder.value_type(value)
    }

    /// Records the values that replace every result of `op`
    pub fn replace_op(&mut self, op: &Operation, values: Vec<ValueId>) {
        assert_eq!(
            op.results.len(),
            values.len(),
            "replacement of '{}' must provide one value per result",
            op.name()
        );
        assert!(
            self.replacement.is_none(),
            "'{}' was replaced twice",
            op.name()
        );

        self.replacement = Some(values);
    }

    /// Creates `kind` with the operands, result types and attributes of `op`
    /// and replaces `op` with it
    pub fn replace_op_with_new(&mut self, op: &Operation, kind: OpKind) -> Vec<ValueId> {
        let result_types = op
            .results
            .iter()
            .map(|r| self.builder.value_type(*r))
            .collect::<Vec<_>>();

        let results = self.builder.create_with_attributes(
            op.location,
            kind,
            op.operands.iter().copied(),
            result_types,
            op.attributes.clone(),
        );
        self.replace_op(op, results.clone());
        results
    }

    pub fn notify_match_failure(&self, reason: impl Into<String>) -> MatchResult {
        MatchResult::NotApplicable(reason.into())
    }

    fn finish(mut self) -> (Vec<Operation>, Option<Vec<ValueId>>) {
        (self.builder.pop_region(), self.replacement)
    }
}

/// Applies `patterns` to `function` until no operation marked illegal by
/// `target` remains. Operations neither legal nor illegal are rewritten when
/// a pattern applies and kept otherwise.
///
/// On failure `function` is left untouched.
pub fn apply_partial_conversion(
    function: &mut Function,
    target: &ConversionTarget,
    patterns: &PatternSet,
) -> Result<(), LegalizeError> {
    let mut working = function.clone();
    let body = std::mem::take(&mut working.body);

    let mut driver = ConversionDriver {
        target,
        patterns,
        replacements: HashMap::new(),
    };

    let operations = driver.convert_operations(&mut working, body.operations, 0)?;
    working.body = Block { operations };
    driver.remap_block(&mut working.body);

    *function = working;
    Ok(())
}

struct ConversionDriver<'a> {
    target: &'a ConversionTarget,
    patterns: &'a PatternSet,
    replacements: HashMap<ValueId, ValueId>,
}

impl ConversionDriver<'_> {
    fn convert_operations(
        &mut self,
        function: &mut Function,
        operations: Vec<Operation>,
        depth: usize,
    ) -> Result<Vec<Operation>, LegalizeError> {
        let mut converted = Vec::with_capacity(operations.len());

        for mut op in operations {
            op.regions = op
                .regions
                .into_iter()
                .map(|region| {
                    self.convert_operations(function, region.operations, depth)
                        .map(|operations| Block { operations })
                })
                .collect::<Result<_, _>>()?;

            for operand in op.operands.iter_mut() {
                *operand = self.resolve(*operand);
            }

            if self.target.is_legal(op.name()) {
                converted.push(op);
                continue;
            }

            match self.try_patterns(function, &op)? {
                Some(replacement_ops) => {
                    if depth >= MAX_REWRITE_DEPTH {
                        return Err(self.failure(&op));
                    }
                    let replacement_ops =
                        self.convert_operations(function, replacement_ops, depth + 1)?;
                    converted.extend(replacement_ops);
                }
                None if self.target.is_illegal(op.name()) => return Err(self.failure(&op)),
                None => converted.push(op),
            }
        }

        Ok(converted)
    }

    /// Returns the operations replacing `op` if a pattern applied
    fn try_patterns(
        &mut self,
        function: &mut Function,
        op: &Operation,
    ) -> Result<Option<Vec<Operation>>, LegalizeError> {
        let patterns = self.patterns;
        for pattern in patterns.candidates(op.name()) {
            let mut rewriter = PatternRewriter::new(function);

            match pattern.match_and_rewrite(op, &mut rewriter)? {
                MatchResult::Applied => {
                    let (operations, replacement) = rewriter.finish();
                    let replacement = replacement.unwrap_or_else(|| {
                        panic!("pattern {} applied without replacing its root", pattern.name())
                    });

                    log::trace!(
                        "{} rewrote '{}' at {} into {} operation(s)",
                        pattern.name(),
                        op.name(),
                        op.location,
                        operations.len()
                    );

                    for (old, new) in op.results.iter().zip(replacement) {
                        self.replacements.insert(*old, new);
                    }
                    return Ok(Some(operations));
                }
                MatchResult::NotApplicable(reason) => {
                    let (operations, _) = rewriter.finish();
                    debug_assert!(
                        operations.is_empty(),
                        "pattern {} created operations but did not apply",
                        pattern.name()
                    );
                    log::trace!(
                        "{} does not apply to '{}' at {}: {reason}",
                        pattern.name(),
                        op.name(),
                        op.location
                    );
                }
            }
        }

        Ok(None)
    }

    fn resolve(&self, mut value: ValueId) -> ValueId {
        while let Some(next) = self.replacements.get(&value) {
            value = *next;
        }
        value
    }

    fn remap_block(&self, block: &mut Block) {
        for op in block.operations.iter_mut() {
            for operand in op.operands.iter_mut() {
                *operand = self.resolve(*operand);
            }
            for region in op.regions.iter_mut() {
                self.remap_block(region);
            }
        }
    }

    fn failure(&self, op: &Operation) -> LegalizeError {
        LegalizeError::FailedToLegalize {
            operation: op.name().to_string(),
            location: op.location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intern::InternedSymbol,
        middle::ir::{CmpIPredicate, Location},
    };

    /// Rewrites `arith.divsi` into a `select` of its operands
    struct DivToSelect(u16);

    impl RewritePattern for DivToSelect {
        fn name(&self) -> &'static str {
            "DivToSelect"
        }

        fn root(&self) -> &'static str {
            "arith.divsi"
        }

        fn benefit(&self) -> u16 {
            self.0
        }

        fn match_and_rewrite(
            &self,
            op: &Operation,
            rewriter: &mut PatternRewriter<'_>,
        ) -> Result<MatchResult, LegalizeError> {
            let builder = rewriter.builder();
            let condition = builder.create_one(
                op.location,
                OpKind::CmpI(CmpIPredicate::Slt),
                op.operands.iter().copied(),
                Type::i1(),
            );
            let select =
                builder.create_select(op.location, condition, op.operands[0], op.operands[1]);
            rewriter.replace_op(op, vec![select]);
            Ok(MatchResult::Applied)
        }
    }

    struct Never;

    impl RewritePattern for Never {
        fn name(&self) -> &'static str {
            "Never"
        }

        fn root(&self) -> &'static str {
            "arith.divsi"
        }

        fn benefit(&self) -> u16 {
            100
        }

        fn match_and_rewrite(
            &self,
            _op: &Operation,
            rewriter: &mut PatternRewriter<'_>,
        ) -> Result<MatchResult, LegalizeError> {
            Ok(rewriter.notify_match_failure("never applies"))
        }
    }

    fn divide_function() -> Function {
        let mut function = Function::new(
            InternedSymbol::new("f"),
            [Type::i32(), Type::i32(), Type::reference(Type::i32())],
            [],
        );
        let (a, b, out) = (
            function.arguments[0],
            function.arguments[1],
            function.arguments[2],
        );
        let mut builder = FirOpBuilder::new(&mut function);
        let quotient = builder.create_one(Location::UNKNOWN, OpKind::DivSI, [a, b], Type::i32());
        builder.create_store(Location::UNKNOWN, quotient, out);
        function
    }

    #[test]
    fn candidates_are_ordered_by_benefit() {
        let mut patterns = PatternSet::new();
        patterns.add(DivToSelect(1)).add(Never);

        let names = patterns
            .candidates("arith.divsi")
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Never", "DivToSelect"]);
    }

    #[test]
    fn uses_are_redirected_to_replacement() {
        let mut function = divide_function();
        let mut target = ConversionTarget::new();
        target.add_illegal_op("arith.divsi");
        let mut patterns = PatternSet::new();
        patterns.add(Never).add(DivToSelect(1));

        apply_partial_conversion(&mut function, &target, &patterns).unwrap();

        assert!(function.operations_named("arith.divsi").is_empty());
        let select = function.operations_named("arith.select")[0].result();
        let store = function.operations_named("fir.store")[0];
        assert_eq!(store.operands[0], select);
    }

    #[test]
    fn surviving_illegal_op_fails_and_leaves_function_untouched() {
        let mut function = divide_function();
        let before = function.body.clone();
        let mut target = ConversionTarget::new();
        target.add_illegal_op("arith.divsi");
        let mut patterns = PatternSet::new();
        patterns.add(Never);

        let error = apply_partial_conversion(&mut function, &target, &patterns).unwrap_err();

        assert!(matches!(error, LegalizeError::FailedToLegalize { .. }));
        assert_eq!(function.body, before);
    }
}
