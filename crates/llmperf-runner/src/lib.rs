pub mod config;
pub mod doctor;
pub mod runner;
pub mod status;
pub mod util;
pub mod workspace;

pub use config::*;
pub use doctor::*;
pub use runner::*;
pub use status::*;
pub use util::*;
pub use workspace::*;
