// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tagged event record that flows through the Bus and into the Transcript.

use serde::{Deserialize, Serialize};

use crate::agent::AgentHandle;
use crate::ballot::{ProposalId, VoteChoice};

/// Variant payload for an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Turn { payload: String },
    Interrupt { priority: u8, payload: String },
    Handoff { target: AgentHandle },
    Complete,
    Error { detail: String },
    Ballot { proposal_id: ProposalId, text: String },
    Vote { proposal_id: ProposalId, choice: VoteChoice },
}

impl EventKind {
    /// Short tag used in the transcript schema's `kind` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Turn { .. } => "TURN",
            Self::Interrupt { .. } => "INTERRUPT",
            Self::Handoff { .. } => "HANDOFF",
            Self::Complete => "COMPLETE",
            Self::Error { .. } => "ERROR",
            Self::Ballot { .. } => "BALLOT",
            Self::Vote { .. } => "VOTE",
        }
    }
}

/// A tagged record: sender, monotonic timestamp, causal sequence number,
/// plus the variant payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sender: AgentHandle,
    /// Monotonic nanoseconds since the scheduler started — see
    /// `scheduler::monotonic_now`. Not wall-clock time.
    pub timestamp: u64,
    pub seq: u64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(sender: impl Into<AgentHandle>, timestamp: u64, seq: u64, kind: EventKind) -> Self {
        Self { sender: sender.into(), timestamp, seq, kind }
    }
}
