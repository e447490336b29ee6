//! The middle end: semantic information consumed by lowering, the IR that
//! lowering produces, and the rewrite driver used to legalize it.

pub mod ir;
pub mod rewrite;
pub mod semantics;
pub mod ty;
