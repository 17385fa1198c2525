pub mod enums;
pub mod grading;
pub mod history;

pub use enums::*;
pub use grading::*;
pub use history::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid value for {field}: '{value}'")]
    InvalidEnum { field: String, value: String },
}
