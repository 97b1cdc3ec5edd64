pub mod batch;
pub mod document;
pub mod enums;
pub mod filters;
pub mod manifest;

pub use batch::*;
pub use document::*;
pub use enums::*;
pub use filters::*;
pub use manifest::*;
