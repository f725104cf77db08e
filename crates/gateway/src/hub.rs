// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event hub.
//!
//! Producers (session manager, extensions, the voice bridge, method
//! handlers) push [`BusEvent`]s into one channel; the hub task fans each
//! event out to subscribed client connections, extension subscribers, the
//! owning source route, and internal taps. Per-connection backlogs are
//! bounded; only the documented high-volume globs may be shed.

use claudia_core::event::droppable_event;
use claudia_core::{BusEvent, ConnectionId, Envelope, EventGlob, GlobSet, ServerFrame};
use claudia_extensions::ExtensionRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

/// Outbound backlog per connection.
pub const OUTBOUND_BACKLOG: usize = 256;

/// Capacity of the internal broadcast tap.
const TAP_CAPACITY: usize = 1024;

struct ConnectionEntry {
    outbound: mpsc::Sender<ServerFrame>,
    subscriptions: GlobSet,
    /// Source routing token this client authenticated as, if any.
    source: Option<String>,
}

struct HubShared {
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    registry: Arc<ExtensionRegistry>,
    tap: broadcast::Sender<BusEvent>,
    dropped: AtomicU64,
}

/// Cloneable handle for producers and the connection layer.
#[derive(Clone)]
pub struct HubHandle {
    bus_tx: mpsc::Sender<BusEvent>,
    shared: Arc<HubShared>,
}

/// The hub task owner.
pub struct Hub {
    bus_rx: mpsc::Receiver<BusEvent>,
    shared: Arc<HubShared>,
}

impl Hub {
    pub fn new(registry: Arc<ExtensionRegistry>) -> (Hub, HubHandle) {
        let (bus_tx, bus_rx) = mpsc::channel(1024);
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        let shared = Arc::new(HubShared {
            connections: Mutex::new(HashMap::new()),
            registry,
            tap,
            dropped: AtomicU64::new(0),
        });
        (
            Hub {
                bus_rx,
                shared: Arc::clone(&shared),
            },
            HubHandle { bus_tx, shared },
        )
    }

    /// Run the fan-out loop until every sender is gone.
    pub async fn run(mut self) {
        while let Some(event) = self.bus_rx.recv().await {
            self.fan_out(event).await;
        }
        debug!("hub closed");
    }

    async fn fan_out(&self, event: BusEvent) {
        trace!(event = %event.event, "fan out");
        // Internal taps (voice bridge, librarian reply collection, tests).
        let _ = self.shared.tap.send(event.clone());

        // Client connections.
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerFrame>)> = {
            let connections = self.shared.connections.lock();
            connections
                .iter()
                .filter(|(id, entry)| {
                    entry.subscriptions.matches(&event.event)
                        && event.visible_to(id, entry.source.as_deref())
                })
                .map(|(id, entry)| (id.clone(), entry.outbound.clone()))
                .collect()
        };
        for (connection_id, outbound) in targets {
            let frame = ServerFrame::event(event.event.clone(), event.payload.clone());
            if droppable_event(&event.event) {
                if outbound.try_send(frame).is_err() {
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(connection = %connection_id, event = %event.event, "shed event");
                }
            } else if outbound.send(frame).await.is_err() {
                debug!(connection = %connection_id, "outbound closed mid-delivery");
            }
        }

        // Extension subscribers.
        for host in self.shared.registry.subscribers(&event.event) {
            let result = host
                .deliver_event(&event.event, event.payload.clone(), Envelope::default())
                .await;
            if let Err(e) = result {
                debug!(error = %e, "extension event delivery failed");
            }
        }

        // Source routing: the owning extension also receives the event as
        // a call, alongside any client delivery ("deliver to both").
        if let Some(source) = &event.source {
            if let Some(host) = self.shared.registry.source_route(source) {
                let source = source.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = host.deliver_source_event(&source, &event).await {
                        warn!(source, error = %e, "source-routed delivery failed");
                    }
                });
            }
        }
    }
}

impl HubHandle {
    /// Sender half for event producers.
    pub fn sink(&self) -> mpsc::Sender<BusEvent> {
        self.bus_tx.clone()
    }

    /// Publish one event.
    pub async fn publish(&self, event: BusEvent) {
        let _ = self.bus_tx.send(event).await;
    }

    /// Subscribe to the internal tap (every event, pre-filtering).
    pub fn tap(&self) -> broadcast::Receiver<BusEvent> {
        self.shared.tap.subscribe()
    }

    /// Register a client connection and its outbound queue.
    pub fn attach(&self, connection_id: ConnectionId, outbound: mpsc::Sender<ServerFrame>) {
        self.shared.connections.lock().insert(
            connection_id,
            ConnectionEntry {
                outbound,
                subscriptions: GlobSet::new(),
                source: None,
            },
        );
    }

    /// Remove a connection; nothing is delivered to it afterwards.
    pub fn detach(&self, connection_id: &ConnectionId) {
        self.shared.connections.lock().remove(connection_id);
    }

    pub fn subscribe(&self, connection_id: &ConnectionId, globs: Vec<EventGlob>) -> usize {
        let mut connections = self.shared.connections.lock();
        let Some(entry) = connections.get_mut(connection_id) else {
            return 0;
        };
        for glob in globs {
            entry.subscriptions.insert(glob);
        }
        entry.subscriptions.len()
    }

    pub fn unsubscribe(&self, connection_id: &ConnectionId, globs: Vec<EventGlob>) -> usize {
        let mut connections = self.shared.connections.lock();
        let Some(entry) = connections.get_mut(connection_id) else {
            return 0;
        };
        for glob in &globs {
            entry.subscriptions.remove(glob);
        }
        entry.subscriptions.len()
    }

    /// Associate a source routing token with a connection.
    pub fn set_source(&self, connection_id: &ConnectionId, source: Option<String>) {
        if let Some(entry) = self.shared.connections.lock().get_mut(connection_id) {
            entry.source = source;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Events shed under backpressure since startup.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
