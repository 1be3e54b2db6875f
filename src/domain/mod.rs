pub mod appliance;
pub mod context;
pub mod preferences;
pub mod prices;
pub mod schedule;

pub use appliance::*;
pub use context::*;
pub use preferences::*;
pub use prices::*;
pub use schedule::*;
