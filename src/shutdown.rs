//! A cancellation token shared by every long running loop of the server.
//!
//! The token is a crossbeam channel that never carries a message: firing the [`Trigger`] drops
//! the only sender, which disconnects every [`Signal`] at once. Loops blocked in a
//! `select!` on [`Signal::receiver`] wake immediately, loops blocked on a socket poll
//! [`Signal::is_fired`] after their deadline.
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

/// creates a connected trigger/signal pair
pub fn channel() -> (Trigger, Signal) {
    let (tx, rx) = channel::bounded(0);
    (Trigger(tx), Signal(rx))
}

/// The firing half of the cancellation token
#[derive(Debug)]
pub struct Trigger(Sender<()>);

impl Trigger {
    /// cancels every [`Signal`] created from this trigger
    pub fn fire(self) {
        drop(self.0);
    }
}

/// The observing half of the cancellation token. Clones observe the same trigger.
#[derive(Debug, Clone)]
pub struct Signal(Receiver<()>);

impl Signal {
    /// true once the trigger has fired (or was dropped)
    pub fn is_fired(&self) -> bool {
        matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// the receiver to wait on inside a `select!`; it becomes ready when the trigger fires
    pub fn receiver(&self) -> &Receiver<()> {
        &self.0
    }
}
