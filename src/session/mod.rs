pub mod signal;
pub mod store;
pub mod sweeper;

pub use signal::{CandidatePayload, SignalKind, SignalMessage};
pub use store::{SessionInfo, SessionStatus, SessionStore};
