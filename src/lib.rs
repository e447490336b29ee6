pub mod backend;
pub mod error;
pub mod index;
pub mod intern;
pub mod lowering;
pub mod middle;

pub use error::{Error, LegalizeError, LowerError};
