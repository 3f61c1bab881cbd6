// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consensus ballots: proposals opened for agent voting with APPROVE/REJECT
//! outcomes, tallied on every vote.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentHandle;

pub type ProposalId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Open,
    Approved,
    Rejected,
    Expired,
}

/// A proposal open for voting. Lifecycle: `Open` on create, then exactly one
/// terminal state (`Approved`, `Rejected`, `Expired`); never reopened.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposal_type: String,
    pub content: String,
    pub proposer: AgentHandle,
    pub status: ProposalStatus,
    pub threshold: f64,
    pub minimum_participants: usize,
    pub deadline: Instant,
    pub weighted: bool,
    votes: HashMap<AgentHandle, VoteChoice>,
}

/// Outcome of casting a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    Recorded,
    AlreadyVoted,
    ProposalClosed,
}

impl Proposal {
    pub fn new(
        proposal_type: impl Into<String>,
        content: impl Into<String>,
        proposer: impl Into<AgentHandle>,
        threshold: f64,
        minimum_participants: usize,
        deadline: Instant,
        weighted: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_type: proposal_type.into(),
            content: content.into(),
            proposer: proposer.into(),
            status: ProposalStatus::Open,
            threshold,
            minimum_participants,
            deadline,
            weighted,
            votes: HashMap::new(),
        }
    }

    pub fn has_voted(&self, agent: &str) -> bool {
        self.votes.contains_key(agent)
    }

    /// Record a vote, applying veto resolution immediately. Does not tally —
    /// the caller (the scheduler, which owns the reputation ledger) must
    /// follow up with [`Proposal::retally`] so weighted mode can look up
    /// every voter's current reputation.
    ///
    /// `has_veto` is whether this agent may unilaterally block proposals of
    /// this type; a REJECT vote from such an agent finalizes the proposal as
    /// `Rejected` regardless of threshold.
    pub fn cast_vote(&mut self, agent: &str, choice: VoteChoice, has_veto: bool) -> CastOutcome {
        if self.status != ProposalStatus::Open {
            return CastOutcome::ProposalClosed;
        }
        if self.has_voted(agent) {
            return CastOutcome::AlreadyVoted;
        }

        self.votes.insert(agent.to_owned(), choice);

        if choice == VoteChoice::Reject && has_veto {
            self.status = ProposalStatus::Rejected;
        }

        CastOutcome::Recorded
    }

    /// Re-tally against a reputation lookup (agent -> reputation), finalizing
    /// the status if threshold or rejection-threshold is crossed.
    pub fn retally(&mut self, reputation_of: impl Fn(&str) -> f64) {
        if self.status != ProposalStatus::Open {
            return;
        }

        let (approve_weight, reject_weight, participants) = if self.weighted {
            let mut approve = 0.0;
            let mut reject = 0.0;
            for (agent, choice) in &self.votes {
                let weight = reputation_of(agent).clamp(0.0, 1.0);
                match choice {
                    VoteChoice::Approve => approve += weight,
                    VoteChoice::Reject => reject += weight,
                }
            }
            (approve, reject, self.votes.len())
        } else {
            let approve = self.votes.values().filter(|c| **c == VoteChoice::Approve).count() as f64;
            let reject = self.votes.values().filter(|c| **c == VoteChoice::Reject).count() as f64;
            (approve, reject, self.votes.len())
        };

        if participants < self.minimum_participants {
            return;
        }

        let total = approve_weight + reject_weight;
        if total <= 0.0 {
            return;
        }

        if approve_weight / total >= self.threshold {
            self.status = ProposalStatus::Approved;
        } else if reject_weight / total > 1.0 - self.threshold {
            self.status = ProposalStatus::Rejected;
        }
    }

    /// Expire the proposal if still open. Idempotent.
    pub fn expire_if_open(&mut self) {
        if self.status == ProposalStatus::Open {
            self.status = ProposalStatus::Expired;
        }
    }

    /// Every recorded vote, agent handle paired with its choice.
    pub fn votes(&self) -> impl Iterator<Item = (&AgentHandle, &VoteChoice)> {
        self.votes.iter()
    }

    pub fn tally(&self) -> (usize, usize) {
        let approve = self.votes.values().filter(|c| **c == VoteChoice::Approve).count();
        let reject = self.votes.values().filter(|c| **c == VoteChoice::Reject).count();
        (approve, reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn vote_and_tally(p: &mut Proposal, agent: &str, choice: VoteChoice, has_veto: bool) -> CastOutcome {
        let outcome = p.cast_vote(agent, choice, has_veto);
        p.retally(|_| 1.0);
        outcome
    }

    #[test]
    fn unweighted_approval_at_threshold() {
        // Scenario E: 5 agents, threshold 0.66, minimum_participants 3.
        // A=APPROVE, B=APPROVE, C=REJECT -> 2/3 ~= 0.667 >= 0.66 -> Approved.
        let mut p = Proposal::new("mediation", "content", "A", 0.66, 3, deadline(), false);
        assert_eq!(vote_and_tally(&mut p, "A", VoteChoice::Approve, false), CastOutcome::Recorded);
        assert_eq!(p.status, ProposalStatus::Open);
        assert_eq!(vote_and_tally(&mut p, "B", VoteChoice::Approve, false), CastOutcome::Recorded);
        assert_eq!(p.status, ProposalStatus::Open);
        assert_eq!(vote_and_tally(&mut p, "C", VoteChoice::Reject, false), CastOutcome::Recorded);
        assert_eq!(p.status, ProposalStatus::Approved);
    }

    #[test]
    fn double_vote_ignored() {
        let mut p = Proposal::new("t", "c", "A", 0.5, 2, deadline(), false);
        assert_eq!(vote_and_tally(&mut p, "A", VoteChoice::Approve, false), CastOutcome::Recorded);
        assert_eq!(p.status, ProposalStatus::Open);
        assert_eq!(p.cast_vote("A", VoteChoice::Reject, false), CastOutcome::AlreadyVoted);
        let (approve, reject) = p.tally();
        assert_eq!((approve, reject), (1, 0));
    }

    #[test]
    fn veto_rejects_immediately_regardless_of_threshold() {
        let mut p = Proposal::new("merge", "c", "A", 0.1, 5, deadline(), false);
        assert_eq!(p.cast_vote("B", VoteChoice::Reject, true), CastOutcome::Recorded);
        assert_eq!(p.status, ProposalStatus::Rejected);
    }

    #[test]
    fn closed_proposal_rejects_further_votes() {
        let mut p = Proposal::new("t", "c", "A", 0.5, 1, deadline(), false);
        p.expire_if_open();
        assert_eq!(p.cast_vote("A", VoteChoice::Approve, false), CastOutcome::ProposalClosed);
    }

    #[test]
    fn weighted_mode_scales_by_reputation() {
        // A (reputation 1.0) approves, B (reputation 0.2) rejects — A's
        // weight dominates the tally and the proposal clears 0.6.
        let mut p = Proposal::new("t", "c", "A", 0.6, 2, deadline(), true);
        p.cast_vote("A", VoteChoice::Approve, false);
        p.cast_vote("B", VoteChoice::Reject, false);
        p.retally(|agent| if agent == "A" { 1.0 } else { 0.2 });
        assert_eq!(p.status, ProposalStatus::Approved);
    }

    #[test]
    fn unweighted_mode_ignores_reputation_lookup() {
        let mut p = Proposal::new("t", "c", "A", 0.6, 2, deadline(), false);
        p.cast_vote("A", VoteChoice::Approve, false);
        p.cast_vote("B", VoteChoice::Reject, false);
        // Even with a skewed lookup, unweighted tallying counts heads, not reputation.
        p.retally(|agent| if agent == "A" { 1.0 } else { 0.01 });
        assert_eq!(p.status, ProposalStatus::Rejected);
    }
}
