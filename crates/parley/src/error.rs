// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy per spec §7: five buckets, each with a fixed recovery
//! policy. The Scheduler decides which bucket an outcome falls into; this
//! module only names the buckets and their policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of the five buckets an error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, transport failure, transient protocol error. Absorbed
    /// locally: record ERROR, apply a reputation delta, keep the agent
    /// active.
    TransientAgent,
    /// Consecutive failures exceeding `FAILURE_TRIGGER`. Triggers leader
    /// election and, optionally, a mute.
    PersistentAgent,
    /// Interrupt depth exceeded `MAX_INTERRUPT_DEPTH`. Freeze interrupts for
    /// one rotation, record ERROR, continue.
    Livelock,
    /// Missing required field, duplicate agent id, unknown proposal type
    /// referenced by a veto map. Refuse to start.
    Configuration,
    /// Empty queue with active agents, negative reputation after clamp,
    /// duplicate sequence number. Abort with exit code 2.
    InvariantViolation,
}

impl FailureKind {
    /// Process exit code this failure should produce if it reaches the top
    /// of the main task, per spec §6.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 1,
            Self::InvariantViolation => 2,
            Self::TransientAgent | Self::PersistentAgent | Self::Livelock => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientAgent => "transient_agent",
            Self::PersistentAgent => "persistent_agent",
            Self::Livelock => "livelock",
            Self::Configuration => "configuration",
            Self::InvariantViolation => "invariant_violation",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, carrying the taxonomy bucket and a human-readable
/// detail string suitable for an ERROR transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: FailureKind,
    pub detail: String,
}

impl ClassifiedError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for ClassifiedError {}

/// Classify a raw `speak` failure description into a [`FailureKind`].
/// Timeouts and transport/protocol hiccups are transient; anything naming an
/// invariant breach is fatal.
pub fn classify(detail: &str) -> FailureKind {
    let lower = detail.to_lowercase();
    if lower.contains("empty-roster") || lower.contains("duplicate sequence") || lower.contains("negative reputation") {
        FailureKind::InvariantViolation
    } else if lower.contains("livelock") {
        FailureKind::Livelock
    } else if lower.contains("duplicate agent") || lower.contains("missing required") || lower.contains("unknown proposal type") {
        FailureKind::Configuration
    } else {
        FailureKind::TransientAgent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_as_transient() {
        assert_eq!(classify("timeout"), FailureKind::TransientAgent);
    }

    #[test]
    fn classifies_empty_roster_as_invariant_violation() {
        assert_eq!(classify("empty-roster"), FailureKind::InvariantViolation);
        assert_eq!(FailureKind::InvariantViolation.exit_code(), 2);
    }

    #[test]
    fn classifies_livelock_freeze() {
        assert_eq!(classify("livelock-freeze"), FailureKind::Livelock);
    }

    #[test]
    fn classifies_duplicate_agent_as_configuration() {
        assert_eq!(classify("duplicate agent id 'A'"), FailureKind::Configuration);
        assert_eq!(FailureKind::Configuration.exit_code(), 1);
    }

    #[test]
    fn display_includes_kind_and_detail() {
        let err = ClassifiedError::new(FailureKind::TransientAgent, "timeout");
        assert_eq!(err.to_string(), "transient_agent: timeout");
    }
}
