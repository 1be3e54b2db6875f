pub mod constraints;
pub mod strategies;
pub mod types;

pub use constraints::*;
pub use strategies::*;
pub use types::*;
