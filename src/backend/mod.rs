//! Target facing legalization of the IR. Before translation to LLVM, abstract
//! vector operations are rewritten into forms that map onto target intrinsics.

pub mod arm_sve;
pub mod vector;
