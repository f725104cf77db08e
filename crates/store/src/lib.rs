// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claudia-store: the embedded relational store.
//!
//! One SQLite file (`store.db`) in WAL mode holds workspaces, session
//! records, file-ingestion state, transcript entries, and conversations.
//! Each subsystem opens its own [`Store`] handle against the same path;
//! WAL plus a bounded busy-wait absorb writer contention. Multi-row
//! consistency (the ingestion file pass, segmentation rebuild, queue pops)
//! uses explicit transactions.

mod conversations;
mod db;
mod entries;
mod error;
mod files;
mod schema;
mod sessions;
mod workspaces;

pub use conversations::{ConversationUpdate, SegmentSpec};
pub use db::Store;
pub use entries::NewEntry;
pub use error::StoreError;
pub use files::PassStats;
