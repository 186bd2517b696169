pub mod session_sm;

pub use session_sm::{InstallState, SessionEvent, SessionMachine};
