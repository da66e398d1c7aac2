//! Client-side incident list with last-write-wins merging.

use std::collections::BTreeMap;

use fireline_incident_models::{ChangeEvent, ChangeKind, Incident};

/// Incidents held by a dashboard, keyed by id.
///
/// Each entry is versioned by `updated_at`; anything older than the held
/// version is discarded, whether it arrives from the feed or a poll.
#[derive(Debug, Clone, Default)]
pub struct LocalView {
    items: BTreeMap<String, Incident>,
}

impl LocalView {
    /// An empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one change event. Returns whether the view changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event.kind {
            ChangeKind::Delete => self.items.remove(&event.incident.id).is_some(),
            ChangeKind::Insert | ChangeKind::Update => self.merge(event.incident.clone()),
        }
    }

    /// Merges one incident. Returns whether the view changed.
    pub fn merge(&mut self, incident: Incident) -> bool {
        match self.items.get(&incident.id) {
            Some(held) if held.updated_at > incident.updated_at => {
                log::debug!(
                    "Discarding stale version of incident {} ({} < {})",
                    incident.id,
                    incident.updated_at,
                    held.updated_at
                );
                false
            }
            Some(held) if *held == incident => false,
            _ => {
                self.items.insert(incident.id.clone(), incident);
                true
            }
        }
    }

    /// Reconciles against a full poll result.
    ///
    /// Incidents absent from the poll are dropped. Incidents present in both
    /// keep whichever version is newer.
    pub fn reconcile(&mut self, polled: Vec<Incident>) {
        let mut next = BTreeMap::new();
        for incident in polled {
            let keep = match self.items.remove(&incident.id) {
                Some(held) if held.updated_at > incident.updated_at => held,
                _ => incident,
            };
            next.insert(keep.id.clone(), keep);
        }
        self.items = next;
    }

    /// Looks up one incident.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.items.get(id)
    }

    /// Number of incidents held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All incidents, newest report first.
    #[must_use]
    pub fn incidents(&self) -> Vec<Incident> {
        let mut list: Vec<Incident> = self.items.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }
}
