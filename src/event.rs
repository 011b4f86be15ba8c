//! Notifications from the engine to its owner
//!
//! The buffer and the session never call back into user code. They post
//! events on a bounded mpsc channel that the owner drains.

/// Something the owner of a session may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// State changed since the last render. Sent once until the dirty
    /// flag is taken.
    Dirty,
    /// BEL was received
    Bell,
    /// OSC 0/2 set a new window title
    TitleChanged(String),
    /// The child process exited
    Exited(Option<i32>),
}
