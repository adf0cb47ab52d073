pub mod manifest;
pub mod store;

pub use manifest::*;
pub use store::*;
