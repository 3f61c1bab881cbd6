// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript — the append-only, in-memory ordered log of committed events.
//! Never mutated after write; the sequence is the authoritative global
//! order. Single-writer (the scheduler), many-reader via a restartable
//! cursor view.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::agent::AgentHandle;
use crate::event::EventKind;

/// Wire schema from spec §6: `{ sequence, wall_time, agent, kind, payload,
/// causal_prev? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sequence: u64,
    pub wall_time: String,
    pub agent: AgentHandle,
    pub kind: String,
    pub payload: String,
    pub causal_prev: Option<u64>,
}

fn iso8601_now() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = since_epoch.as_secs();
    let millis = since_epoch.subsec_millis();
    // Minimal ISO 8601 UTC rendering, no calendar dependency.
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let (y, mo, d) = civil_from_days(days as i64);
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{m:02}:{s:02}.{millis:03}Z")
}

/// Howard Hinnant's days-from-civil algorithm, inverted (days-to-civil).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Append-only ordered log of `(sequence, agent, kind, payload, wall_time)`.
pub struct Transcript {
    entries: Arc<RwLock<Vec<TranscriptEntry>>>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self { entries: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Append a new entry. `sequence` must be strictly increasing; callers
    /// (the scheduler) are the single writer and own sequence allocation.
    pub async fn append(
        &self,
        sequence: u64,
        agent: impl Into<AgentHandle>,
        kind: &EventKind,
        payload: impl Into<String>,
        causal_prev: Option<u64>,
    ) -> TranscriptEntry {
        let entry = TranscriptEntry {
            sequence,
            wall_time: iso8601_now(),
            agent: agent.into(),
            kind: kind.tag().to_owned(),
            payload: payload.into(),
            causal_prev,
        };
        self.entries.write().await.push(entry.clone());
        entry
    }

    /// A restartable view over all entries with `sequence > since`.
    pub async fn since(&self, since: u64) -> Vec<TranscriptEntry> {
        self.entries.read().await.iter().filter(|e| e.sequence > since).cloned().collect()
    }

    /// The full transcript, in commit order.
    pub async fn all(&self) -> Vec<TranscriptEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
