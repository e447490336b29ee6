use thiserror::Error;

use crate::middle::ir::Location;

/// Top-level error type for the lowering and legalization pipelines.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lowering error: {0}")]
    Lower(#[from] LowerError),

    #[error("legalization error: {0}")]
    Legalize(#[from] LegalizeError),
}

/// Failures that abort lowering of the current program unit.
#[derive(Debug, Error)]
pub enum LowerError {
    /// A construct for which no lowering exists yet. Raised through
    /// [`lower_todo!`] so that the emitting site can be recorded.
    #[error("{location}: not yet implemented: {feature}{}", format_origin(.origin))]
    Todo {
        location: Location,
        feature: String,
        origin: Option<String>,
    },

    #[error("{location}: fatal error: {message}")]
    Fatal { location: Location, message: String },

    #[error("{location}: symbol '{name}' has no value bound in the active symbol map")]
    UnboundSymbol { location: Location, name: String },
}

fn format_origin(origin: &Option<String>) -> String {
    match origin {
        Some(origin) => format!(" (raised at {origin})"),
        None => String::new(),
    }
}

/// Failures of the pattern rewrite driver. A pattern that merely does not
/// apply is not an error, see [`crate::middle::rewrite::MatchResult`].
#[derive(Debug, Error)]
pub enum LegalizeError {
    #[error("{location}: failed to legalize operation '{operation}'")]
    FailedToLegalize {
        operation: String,
        location: Location,
    },

    #[error("{location}: malformed operation '{operation}': {message}")]
    MalformedOperation {
        operation: String,
        location: Location,
        message: String,
    },
}

/// Builds a [`LowerError::Todo`] for a construct that has no lowering yet.
///
/// With the `error-backtrace` feature the module path and source position of
/// the call site are attached to the error.
macro_rules! lower_todo {
    ($location:expr, $feature:expr $(,)?) => {{
        #[cfg(feature = "error-backtrace")]
        let origin = Some(format!(
            "{} {}:{}:{}",
            module_path!(),
            file!(),
            line!(),
            column!()
        ));
        #[cfg(not(feature = "error-backtrace"))]
        let origin: Option<String> = None;

        $crate::error::LowerError::Todo {
            location: $location,
            feature: ($feature).to_string(),
            origin,
        }
    }};
}

pub(crate) use lower_todo;
