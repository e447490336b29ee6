//! Shape and length analysis of a symbol, independent of any IR value.

use crate::middle::semantics::{ArraySpec, Bound, CharLength, DeclaredType, Symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeAnalysis {
    /// `None` for assumed rank
    rank: Option<usize>,
    char_length: Option<CharLength>,
    lower_bounds: LowerBounds,
    /// All bounds of an explicit shape are constants
    static_extents: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LowerBounds {
    /// Scalars, deferred shapes and assumed rank
    NotApplicable,
    Static(Vec<i64>),
    /// At least one lower bound is only known at runtime
    Dynamic,
}

impl ShapeAnalysis {
    pub fn analyze(symbol: &Symbol) -> Self {
        let char_length = match symbol.declared_type() {
            Some(DeclaredType::Character { length, .. }) => Some(*length),
            _ => None,
        };

        let (lower_bounds, static_extents) = match symbol.array_spec() {
            ArraySpec::Scalar | ArraySpec::Deferred(_) | ArraySpec::AssumedRank => {
                (LowerBounds::NotApplicable, false)
            }
            ArraySpec::Explicit(dims) => (
                dims.iter()
                    .map(|dim| match dim.lower {
                        Bound::Constant(value) => Some(value),
                        Bound::Expression => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .map_or(LowerBounds::Dynamic, LowerBounds::Static),
                dims.iter().all(|dim| {
                    matches!(
                        (dim.lower, dim.upper),
                        (Bound::Constant(_), Bound::Constant(_))
                    )
                }),
            ),
            // The descriptor of an assumed-shape dummy is authoritative
            ArraySpec::AssumedShape(_) => (LowerBounds::Dynamic, false),
        };

        Self {
            rank: symbol.rank(),
            char_length,
            lower_bounds,
            static_extents,
        }
    }

    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    pub fn is_array(&self) -> bool {
        self.rank != Some(0)
    }

    pub fn is_char(&self) -> bool {
        self.char_length.is_some()
    }

    /// A scalar that is not a character
    pub fn is_trivial(&self) -> bool {
        !self.is_array() && !self.is_char()
    }

    pub fn char_len_const(&self) -> Option<i64> {
        match self.char_length {
            Some(CharLength::Constant(len)) => Some(len.max(0)),
            _ => None,
        }
    }

    /// The length is given by a non constant specification expression
    pub fn char_len_expr(&self) -> bool {
        matches!(self.char_length, Some(CharLength::Expression))
    }

    /// Explicit shape whose bounds are all constants
    pub fn is_static_array(&self) -> bool {
        self.static_extents
    }

    pub fn static_lbounds(&self) -> Option<&[i64]> {
        match &self.lower_bounds {
            LowerBounds::Static(bounds) => Some(bounds),
            _ => None,
        }
    }

    /// True only when every lower bound is statically known to be 1
    pub fn lbound_is_all_ones(&self) -> bool {
        self.static_lbounds()
            .is_some_and(|bounds| bounds.iter().all(|lb| *lb == 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::semantics::{IntrinsicCategory, ShapeSpec};

    fn real() -> DeclaredType {
        DeclaredType::Intrinsic {
            category: IntrinsicCategory::Real,
            kind: 4,
        }
    }

    #[test]
    fn assumed_shape_lower_bounds_are_not_all_ones() {
        let default_lbound =
            Symbol::object("y", real(), ArraySpec::AssumedShape(vec![Bound::Constant(1)]));
        let analysis = ShapeAnalysis::analyze(&default_lbound);

        assert!(analysis.is_array());
        assert!(!analysis.is_static_array());
        assert!(!analysis.lbound_is_all_ones());
        assert_eq!(analysis.static_lbounds(), None);
    }

    #[test]
    fn explicit_shape_bounds() {
        let shifted = Symbol::object(
            "a",
            real(),
            ArraySpec::Explicit(vec![ShapeSpec {
                lower: Bound::Constant(0),
                upper: Bound::Constant(4),
            }]),
        );
        let analysis = ShapeAnalysis::analyze(&shifted);

        assert!(analysis.is_static_array());
        assert!(!analysis.lbound_is_all_ones());
        assert!(!analysis.is_trivial());
    }

    #[test]
    fn character_lengths() {
        let constant = Symbol::object(
            "c",
            DeclaredType::Character {
                kind: 1,
                length: CharLength::Constant(-3),
            },
            ArraySpec::Scalar,
        );
        let analysis = ShapeAnalysis::analyze(&constant);

        assert!(analysis.is_char());
        assert_eq!(analysis.char_len_const(), Some(0));
        assert!(!analysis.char_len_expr());
    }
}
