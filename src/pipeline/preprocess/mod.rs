pub mod filter;
pub mod worker;
pub mod preparer;

pub use filter::*;
pub use worker::*;
pub use preparer::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Pixel filter worker could not be started: {0}")]
    WorkerSpawn(String),

    #[error("Pixel filter worker is not running")]
    WorkerGone,

    #[error("Pixel filter reply for job {actual} delivered to job {expected}")]
    TokenMismatch { expected: u64, actual: u64 },
}

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Could not load image '{name}': {reason}")]
    Decode { name: String, reason: String },

    #[error("Could not encode image '{name}': {reason}")]
    Encode { name: String, reason: String },

    #[error("Pixel filter failed: {0}")]
    Filter(#[from] FilterError),
}
