pub mod actor;
pub mod error;
pub mod registry;
pub mod session;
pub mod ticker;

pub use actor::{PlayOutcome, QueueView, SessionDeps, SessionHandle, spawn_session};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{PlaybackSession, ResumePoint, Selection};
pub use ticker::Ticker;
