//! Keystroke coalescing.
//!
//! While a window is open for a group, new input only overwrites the pending term. When the
//! window closes, the last term is flushed as a single search.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct Debouncer {
    pending: HashMap<String, (u64, String)>,
    next_window: u64,
}

impl Debouncer {
    /// Record `term` for `group`.
    ///
    /// Returns the id of a newly opened window, or `None` when a window was already open and
    /// the pending term was overwritten.
    pub(crate) fn offer(&mut self, group: &str, term: &str) -> Option<u64> {
        if let Some((_, pending)) = self.pending.get_mut(group) {
            *pending = term.to_owned();
            return None;
        }
        self.next_window += 1;
        self.pending
            .insert(group.to_owned(), (self.next_window, term.to_owned()));
        Some(self.next_window)
    }

    /// Close `window` and return its pending term.
    ///
    /// Returns `None` if the window was cancelled in the meantime.
    pub(crate) fn take(&mut self, group: &str, window: u64) -> Option<String> {
        match self.pending.get(group) {
            Some((open, _)) if *open == window => self.pending.remove(group).map(|(_, term)| term),
            _ => None,
        }
    }

    /// Drop the pending term of `group`, if any
    pub(crate) fn cancel(&mut self, group: &str) -> bool {
        self.pending.remove(group).is_some()
    }
}
