// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus events and event-name glob matching.
//!
//! Events are named `namespace.noun.verb`. Subscriptions are expressed as
//! globs: an exact name, or `prefix.*` matching any event under the prefix.

use crate::id::ConnectionId;
use serde::{Deserialize, Serialize};

/// An event travelling the gateway bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub event: String,
    pub payload: serde_json::Value,
    /// When set, only the matching connection (or a subscriber whose source
    /// token matches) receives the event; a registered source route also
    /// receives it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    /// Source routing token associating the event with an external origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<serde_json::Value>,
}

impl BusEvent {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
            connection_id: None,
            source: None,
            tags: None,
        }
    }

    pub fn for_connection(mut self, connection_id: ConnectionId) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether a subscriber may see this event.
    ///
    /// Events without a connection tag are broadcast; tagged events reach
    /// the tagged connection, or a subscriber whose source routing token
    /// matches the event's source.
    pub fn visible_to(&self, connection: &ConnectionId, source: Option<&str>) -> bool {
        match &self.connection_id {
            None => true,
            Some(target) if target == connection => true,
            Some(_) => matches!((&self.source, source), (Some(a), Some(b)) if a == b),
        }
    }
}

/// One subscription pattern: exact name or `prefix.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventGlob(String);

impl EventGlob {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, event: &str) -> bool {
        match self.0.strip_suffix(".*") {
            Some(prefix) => event
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => {
                // A bare "*" subscribes to everything.
                self.0 == "*" || self.0 == event
            }
        }
    }
}

impl From<&str> for EventGlob {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A connection's set of subscription globs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobSet {
    globs: Vec<EventGlob>,
}

impl GlobSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, glob: EventGlob) {
        if !self.globs.contains(&glob) {
            self.globs.push(glob);
        }
    }

    pub fn remove(&mut self, glob: &EventGlob) {
        self.globs.retain(|g| g != glob);
    }

    pub fn matches(&self, event: &str) -> bool {
        self.globs.iter().any(|g| g.matches(event))
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.globs.len()
    }
}

/// Event globs whose backlog may be shed under outbound backpressure.
///
/// High-volume pure broadcast streams only; responses and lifecycle events
/// are never dropped.
pub const DROPPABLE_GLOBS: &[&str] = &["sse.*", "voice.audio_chunk"];

/// Whether an event name is eligible for backpressure shedding.
pub fn droppable_event(event: &str) -> bool {
    DROPPABLE_GLOBS.iter().any(|g| EventGlob::new(*g).matches(event))
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
