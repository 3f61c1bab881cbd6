// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reputation ledger — pure state, no dependencies on the rest of the core.
//!
//! Mutations are additive with clamping to `[0, 1]`. A cooldown timer per
//! `(agent, delta kind)` suppresses repeated application within a
//! configured window so a single noisy burst of timeouts can't crater an
//! agent's score.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::agent::AgentHandle;

/// Named deltas, each with a fixed magnitude per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Timeout,
    Error,
    SlowResponse,
    ApprovedProposal,
    RejectedProposal,
    AgreementWithConsensus,
    Disagreement,
}

impl DeltaKind {
    pub fn magnitude(self) -> f64 {
        match self {
            Self::Timeout => -0.2,
            Self::Error => -0.1,
            Self::SlowResponse => -0.05,
            Self::ApprovedProposal => 0.03,
            Self::RejectedProposal => -0.03,
            Self::AgreementWithConsensus => 0.02,
            Self::Disagreement => -0.05,
        }
    }
}

const INITIAL_REPUTATION: f64 = 1.0;

/// Mapping from agent handle to reputation score, with cooldown tracking.
pub struct ReputationLedger {
    scores: HashMap<AgentHandle, f64>,
    last_applied: HashMap<(AgentHandle, DeltaKind), Instant>,
    cooldown: Duration,
}

impl ReputationLedger {
    pub fn new(cooldown: Duration) -> Self {
        Self { scores: HashMap::new(), last_applied: HashMap::new(), cooldown }
    }

    /// Current reputation for `agent`, registering it at the initial score
    /// of 1.0 if unseen.
    pub fn get(&mut self, agent: &str) -> f64 {
        *self.scores.entry(agent.to_owned()).or_insert(INITIAL_REPUTATION)
    }

    /// Read-only lookup that does not register an unseen agent.
    pub fn peek(&self, agent: &str) -> f64 {
        self.scores.get(agent).copied().unwrap_or(INITIAL_REPUTATION)
    }

    /// Whether `kind` may be applied to `agent` right now (outside its cooldown).
    pub fn cooldown_ok(&self, agent: &str, kind: DeltaKind) -> bool {
        match self.last_applied.get(&(agent.to_owned(), kind)) {
            Some(last) => last.elapsed() >= self.cooldown,
            None => true,
        }
    }

    /// Stamp `kind` as just-applied for `agent`.
    pub fn mark(&mut self, agent: &str, kind: DeltaKind) {
        self.last_applied.insert((agent.to_owned(), kind), Instant::now());
    }

    /// Apply `kind`'s delta to `agent`, clamped to `[0, 1]`, unless the
    /// cooldown for this `(agent, kind)` pair has not yet elapsed. Returns
    /// the resulting score, or `None` if suppressed by cooldown.
    pub fn adjust(&mut self, agent: &str, kind: DeltaKind) -> Option<f64> {
        if !self.cooldown_ok(agent, kind) {
            return None;
        }
        let current = self.get(agent);
        let next = (current + kind.magnitude()).clamp(0.0, 1.0);
        self.scores.insert(agent.to_owned(), next);
        self.mark(agent, kind);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_agent_starts_at_one() {
        let mut ledger = ReputationLedger::new(Duration::from_secs(0));
        assert_eq!(ledger.get("A"), 1.0);
    }

    #[test]
    fn clamps_to_zero_on_repeated_timeouts() {
        let mut ledger = ReputationLedger::new(Duration::from_secs(0));
        for _ in 0..10 {
            ledger.adjust("A", DeltaKind::Timeout);
        }
        assert_eq!(ledger.peek("A"), 0.0);
    }

    #[test]
    fn clamps_to_one_on_repeated_approvals() {
        let mut ledger = ReputationLedger::new(Duration::from_secs(0));
        for _ in 0..10 {
            ledger.adjust("A", DeltaKind::ApprovedProposal);
        }
        assert_eq!(ledger.peek("A"), 1.0);
    }

    #[test]
    fn cooldown_suppresses_rapid_repeats() {
        let mut ledger = ReputationLedger::new(Duration::from_secs(60));
        let first = ledger.adjust("A", DeltaKind::Timeout);
        assert_eq!(first, Some(0.8));
        let second = ledger.adjust("A", DeltaKind::Timeout);
        assert_eq!(second, None);
        assert_eq!(ledger.peek("A"), 0.8);
    }

    #[test]
    fn different_kinds_have_independent_cooldowns() {
        let mut ledger = ReputationLedger::new(Duration::from_secs(60));
        assert!(ledger.adjust("A", DeltaKind::Timeout).is_some());
        assert!(ledger.adjust("A", DeltaKind::Error).is_some());
    }
}
