//! Session history reconstructed from committed navigations.
//!
//! For engines that report page loads but do not expose back/forward
//! state. A traversal requested through [`NavigationHistory::begin_back`]
//! or [`NavigationHistory::begin_forward`] is matched against the next
//! committed URL; anything else is a new entry that drops forward history.

use crate::surface::HistoryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTraversal {
    Back,
    Forward,
}

#[derive(Debug, Clone, Default)]
pub struct NavigationHistory {
    entries: Vec<String>,
    current: Option<usize>,
    pending: Option<PendingTraversal>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HistoryState {
        match self.current {
            Some(index) => HistoryState {
                can_go_back: index > 0,
                can_go_forward: index + 1 < self.entries.len(),
            },
            None => HistoryState::default(),
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current.map(|i| self.entries[i].as_str())
    }

    /// Mark that a back traversal was requested. Returns false when there
    /// is nothing to go back to.
    pub fn begin_back(&mut self) -> bool {
        let available = self.state().can_go_back;
        if available {
            self.pending = Some(PendingTraversal::Back);
        }
        available
    }

    pub fn begin_forward(&mut self) -> bool {
        let available = self.state().can_go_forward;
        if available {
            self.pending = Some(PendingTraversal::Forward);
        }
        available
    }

    /// Record a finished navigation to `url`.
    pub fn commit(&mut self, url: &str) {
        let pending = self.pending.take();
        let Some(index) = self.current else {
            self.entries.push(url.to_string());
            self.current = Some(0);
            return;
        };

        match pending {
            Some(PendingTraversal::Back) if index > 0 && self.entries[index - 1] == url => {
                self.current = Some(index - 1);
            }
            Some(PendingTraversal::Forward)
                if index + 1 < self.entries.len() && self.entries[index + 1] == url =>
            {
                self.current = Some(index + 1);
            }
            _ if self.entries[index] == url => {
                // Reload of the current entry.
            }
            _ => {
                self.entries.truncate(index + 1);
                self.entries.push(url.to_string());
                self.current = Some(index + 1);
            }
        }
    }
}
