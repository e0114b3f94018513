// ABOUTME: Interactive container shells - many concurrent sessions, each addressed by its own id

pub mod session_registry;

pub use session_registry::{SessionInfo, SessionRegistry};
