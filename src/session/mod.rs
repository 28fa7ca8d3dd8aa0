pub mod bridge;
pub mod controller;
pub mod state;

pub use bridge::{EventStore, FocusStream, PageVerdict, ResultBridge, ResultSink, StreamMessage};
pub use controller::{MonitorSnapshot, SessionController, SessionError, SessionStarted};
pub use state::{ActiveSession, SessionState};
