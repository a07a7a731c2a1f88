pub mod events;
pub mod host;
pub mod stats;
pub mod status;
pub mod tracks;

pub use events::*;
pub use host::*;
pub use stats::*;
pub use status::*;
pub use tracks::*;
