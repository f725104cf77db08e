// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted launcher for tests.
//!
//! Each user input pops the next scripted turn and plays its events; a
//! dying turn closes the stream afterwards, imitating a child crash. All
//! launches and inputs are recorded for assertions.

use crate::launcher::{AgentLauncher, ChildHandle, ChildInput, LaunchError, LaunchSpec};
use async_trait::async_trait;
use claudia_core::AgentEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
struct ScriptedTurn {
    events: Vec<AgentEvent>,
    then_die: bool,
}

/// A launcher that plays scripts instead of spawning processes.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    /// Every spec passed to `launch`, in order.
    pub launches: Arc<Mutex<Vec<LaunchSpec>>>,
    /// Every input any child received, in order.
    pub inputs: Arc<Mutex<Vec<ChildInput>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response to the next user input.
    pub fn push_turn(&self, events: Vec<AgentEvent>) {
        self.turns.lock().push_back(ScriptedTurn {
            events,
            then_die: false,
        });
    }

    /// Script a response after which the child dies mid-stream.
    pub fn push_dying_turn(&self, events: Vec<AgentEvent>) {
        self.turns.lock().push_back(ScriptedTurn {
            events,
            then_die: true,
        });
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    pub fn recorded_inputs(&self) -> Vec<ChildInput> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl AgentLauncher for FakeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ChildHandle, LaunchError> {
        self.launches.lock().push(spec.clone());

        let (input_tx, mut input_rx) = mpsc::channel::<ChildInput>(32);
        let (event_tx, event_rx) = mpsc::channel::<AgentEvent>(256);
        let (abort_tx, mut abort_rx) = oneshot::channel::<()>();

        let turns = Arc::clone(&self.turns);
        let inputs = Arc::clone(&self.inputs);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut abort_rx => break,
                    input = input_rx.recv() => {
                        let Some(input) = input else { break };
                        let is_user = matches!(input, ChildInput::User { .. });
                        inputs.lock().push(input);
                        if !is_user {
                            continue;
                        }
                        let turn = turns.lock().pop_front();
                        let Some(turn) = turn else { continue };
                        for event in turn.events {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        if turn.then_die {
                            return;
                        }
                    }
                }
            }
        });

        Ok(ChildHandle::new(input_tx, event_rx, abort_tx))
    }
}
