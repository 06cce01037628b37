pub mod config;
pub mod error;
pub mod types;

pub use error::{VfcError, VfcResult};
pub use types::{Algorithm, Direction};
