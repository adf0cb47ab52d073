pub mod csv;
pub mod memory;
pub mod traits;

pub use crate::csv::*;
pub use memory::*;
pub use traits::*;
