pub mod registry;
pub mod table;

pub use registry::*;
pub use table::*;
