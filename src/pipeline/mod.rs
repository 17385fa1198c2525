pub mod preprocess;
pub mod intake;
pub mod grading;
pub mod render;
