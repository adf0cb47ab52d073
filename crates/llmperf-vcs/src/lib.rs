pub mod contract;
pub mod patch;
pub mod types;

pub use patch::{normalize_patch, NormalizedPatch};
pub use types::*;
