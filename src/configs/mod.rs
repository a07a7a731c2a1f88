pub mod base;
pub mod logging;
pub mod player;
pub mod server;
pub mod sources;
pub mod stats;

pub use base::*;
pub use logging::*;
pub use player::*;
pub use server::*;
pub use sources::*;
pub use stats::*;
