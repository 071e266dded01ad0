//! Notifications for external collaborators (counters, empty-state messages...).

use std::time::SystemTime;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The visible set of a group changed
    GroupVisibilityChanged {
        /// Group name
        group: String,
        /// Number of visible items after the change
        visible: usize,
    },
    /// An external tag reconciliation was flushed
    SynchronizationComplete {
        /// When the flush happened
        timestamp: SystemTime,
        /// Number of elements whose checked state was written
        updated: usize,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    subscribers: Vec<UnboundedSender<Notification>>,
}

impl Notifier {
    pub(crate) fn subscribe(&mut self) -> UnboundedReceiver<Notification> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, notification: Notification) {
        trace!("notify {notification:?}");
        self.subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }
}
