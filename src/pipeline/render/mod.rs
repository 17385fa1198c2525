pub mod alignment;
pub mod view;
pub mod summary;

pub use alignment::*;
pub use view::*;
pub use summary::*;
