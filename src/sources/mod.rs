pub mod local;
pub mod resolver;

pub use local::LocalSource;
pub use resolver::{ResolveError, TrackResolver};
