pub mod event;
pub mod session;

pub use event::FocusEvent;
pub use session::{Session, SessionStatus};
