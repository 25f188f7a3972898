//! Presentation-side copy of the discoverable session list.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use shared::domain::{DiscoveredSession, SessionName};

/// Mirrors discovery updates for the role-selection list. Entries are copies; an entry missing
/// from later updates stays visible until it has not been seen for `stale_after`.
#[derive(Debug, Clone)]
pub struct SessionListMirror {
    entries: BTreeMap<SessionName, DiscoveredSession>,
    stale_after: Duration,
    selected: Option<SessionName>,
}

impl SessionListMirror {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            stale_after,
            selected: None,
        }
    }

    /// Upserts every session in `update`, then prunes at `now`.
    pub fn apply_update(&mut self, update: Vec<DiscoveredSession>, now: DateTime<Utc>) {
        for session in update {
            match self.entries.get(&session.name) {
                Some(existing) if existing.last_seen_at > session.last_seen_at => {}
                _ => {
                    self.entries.insert(session.name.clone(), session);
                }
            }
        }
        self.prune(now);
    }

    /// Drops entries unseen for `stale_after`; returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let stale_after = self.stale_after;
        self.entries.retain(|_, session| {
            match now.signed_duration_since(session.last_seen_at).to_std() {
                Ok(age) => age < stale_after,
                // Seen "in the future": clock skew between producer and UI.
                Err(_) => true,
            }
        });

        if let Some(selected) = &self.selected {
            if !self.entries.contains_key(selected) {
                tracing::debug!(session = %selected, "selected session went stale");
                self.selected = None;
            }
        }

        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "pruned stale sessions");
        }
        removed
    }

    pub fn get(&self, name: &SessionName) -> Option<&DiscoveredSession> {
        self.entries.get(name)
    }

    /// Sessions ordered by name.
    pub fn sessions(&self) -> impl Iterator<Item = &DiscoveredSession> {
        self.entries.values()
    }

    pub fn joinable(&self) -> impl Iterator<Item = &DiscoveredSession> {
        self.entries.values().filter(|session| !session.is_full())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn select(&mut self, name: &SessionName) -> bool {
        if self.entries.contains_key(name) {
            self.selected = Some(name.clone());
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<&DiscoveredSession> {
        self.selected.as_ref().and_then(|name| self.entries.get(name))
    }
}

#[cfg(test)]
#[path = "tests/session_list_tests.rs"]
mod tests;
