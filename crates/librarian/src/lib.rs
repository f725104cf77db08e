// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claudia-librarian: the background conversation worker.
//!
//! A single task drains queued conversations one at a time: format the
//! transcript, open a dedicated agent session in a private workspace, ask
//! for a summary, commit whatever the agent wrote to the version-controlled
//! artifact directory, and mark the conversation archived (or skipped).
//! Failures roll the conversation back to queued; the worker never dies.

pub mod git;
pub mod transcript;
pub mod worker;

pub use git::{commit_artifacts, GitError};
pub use transcript::{context_block, format_transcript, parse_reply, ReplyOutcome};
pub use worker::{AgentGateway, LibrarianConfig, LibrarianHandle, LibrarianWorker};
