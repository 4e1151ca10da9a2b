pub mod session;

pub use session::{CommitOutcome, CommitSession, Draft, SessionState};
