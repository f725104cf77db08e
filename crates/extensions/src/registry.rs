// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of live extension hosts.
//!
//! Resolves fully-qualified method names, event subscriptions, and source
//! routes to the host that owns them. Registration replaces prior state
//! for the same extension id.

use crate::host::{ExtensionHost, HostSnapshot};
use crate::protocol::ExtensionManifest;
use claudia_core::{EventGlob, ExtensionId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Clone)]
struct Entry {
    host: ExtensionHost,
    manifest: ExtensionManifest,
}

/// Live extensions, keyed by their registered id.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: Mutex<HashMap<ExtensionId, Entry>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a (re-)registration. Replaces any previous manifest for the
    /// same id.
    pub fn register(&self, host: ExtensionHost, manifest: ExtensionManifest) {
        let id = ExtensionId::new(manifest.id.clone());
        self.entries.lock().insert(id, Entry { host, manifest });
    }

    pub fn remove(&self, id: &ExtensionId) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Resolve a method by fully-qualified name.
    pub fn method_host(&self, method: &str) -> Option<(ExtensionId, ExtensionHost)> {
        let entries = self.entries.lock();
        entries.iter().find_map(|(id, entry)| {
            entry
                .manifest
                .methods
                .iter()
                .any(|m| m.name == method)
                .then(|| (id.clone(), entry.host.clone()))
        })
    }

    /// Hosts whose subscriptions match an event name.
    pub fn subscribers(&self, event: &str) -> Vec<ExtensionHost> {
        let entries = self.entries.lock();
        entries
            .values()
            .filter(|entry| {
                entry
                    .manifest
                    .events
                    .iter()
                    .any(|glob| EventGlob::new(glob.clone()).matches(event))
            })
            .map(|entry| entry.host.clone())
            .collect()
    }

    /// Host owning a source routing token.
    pub fn source_route(&self, source: &str) -> Option<ExtensionHost> {
        let entries = self.entries.lock();
        entries
            .values()
            .find(|entry| entry.manifest.source_routes.iter().any(|r| r == source))
            .map(|entry| entry.host.clone())
    }

    /// All registered method declarations, for `method.list`.
    pub fn method_list(&self) -> Vec<crate::protocol::MethodDecl> {
        let entries = self.entries.lock();
        let mut methods: Vec<_> = entries
            .values()
            .flat_map(|entry| entry.manifest.methods.iter().cloned())
            .collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        methods
    }

    /// Snapshots for `extension.list`.
    pub fn snapshots(&self) -> Vec<(ExtensionId, HostSnapshot)> {
        let entries = self.entries.lock();
        let mut rows: Vec<_> = entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.host.snapshot()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
