pub mod enums;
pub mod extraction;
pub mod normalized;

pub use enums::*;
pub use extraction::*;
pub use normalized::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },
}
