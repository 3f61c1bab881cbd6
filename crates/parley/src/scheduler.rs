// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler — the event loop: pick the next speaker, bound their speech
//! slice, honor interrupts, detect timeouts, record the transcript, trigger
//! recovery. Single-writer: the Turn Queue, Interrupt Heap, Reputation
//! Ledger, and proposal table are owned exclusively by the task running
//! [`Scheduler::run`]; every other caller talks to it through
//! [`SchedulerHandle`] and an internal command channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{Agent, AgentHandle, AgentKind, Speak, SpeakError};
use crate::ballot::{CastOutcome, Proposal, ProposalId, ProposalStatus, VoteChoice};
use crate::bus::{Bus, GLOBAL_TOPIC};
use crate::event::{Event, EventKind};
use crate::interrupt_heap::InterruptHeap;
use crate::reputation::{DeltaKind, ReputationLedger};
use crate::transcript::{Transcript, TranscriptEntry};
use crate::turn_queue::TurnQueue;

/// Tuning knobs enumerated in spec §4.4.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub min_slice: Duration,
    pub max_turn: Duration,
    pub preempt_threshold: f64,
    pub max_interrupt_depth: u32,
    pub failure_trigger: u32,
    pub quorum_default: f64,
    pub interrupt_keywords: Vec<String>,
    pub reputation_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_slice: Duration::from_millis(1500),
            max_turn: Duration::from_millis(5000),
            preempt_threshold: 90.0,
            max_interrupt_depth: 3,
            failure_trigger: 3,
            quorum_default: 0.66,
            interrupt_keywords: vec![
                "urgent".into(),
                "critical".into(),
                "emergency".into(),
                "important".into(),
                "!!".into(),
            ],
            reputation_cooldown: Duration::from_secs(30),
        }
    }
}

/// Commands funneled through the single-writer channel. External callers
/// never touch Turn Queue, Interrupt Heap, or Reputation Ledger directly.
enum Command {
    Register(Agent, Vec<String>),
    Unregister(AgentHandle),
    RequestInterrupt { agent: AgentHandle, raw_priority: u8, payload: String },
    RequestHandoff { to: AgentHandle, payload: String },
    StartBallot {
        proposal_type: String,
        content: String,
        proposer: AgentHandle,
        deadline: Instant,
        threshold: f64,
        minimum_participants: usize,
        weighted: bool,
        reply: oneshot::Sender<ProposalId>,
    },
    CastVote { proposal_id: ProposalId, agent: AgentHandle, choice: VoteChoice, reply: oneshot::Sender<CastOutcome> },
    /// Capability-object signal (spec §9): the agent declares the
    /// conversation finished. Terminates the loop gracefully.
    Complete(AgentHandle),
    /// Capability-object signal: the agent reports an exception outside its
    /// `speak` return value. Recorded like any other agent error.
    AgentError { agent: AgentHandle, detail: String },
    Stop,
}

/// What the caller should do after processing one [`Command`].
enum Directive {
    Continue,
    Stop,
    Complete,
}

/// The capability object handed to an agent at registration per spec §9:
/// `request_interrupt`, `request_handoff`, `complete`, `error` — no
/// back-pointer to the Scheduler itself.
#[derive(Clone)]
pub struct AgentControl {
    handle: AgentHandle,
    commands: mpsc::Sender<Command>,
}

impl AgentControl {
    pub async fn request_interrupt(&self, raw_priority: u8, payload: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::RequestInterrupt {
                agent: self.handle.clone(),
                raw_priority,
                payload: payload.into(),
            })
            .await;
    }

    pub async fn request_handoff(&self, to: impl Into<AgentHandle>, payload: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::RequestHandoff { to: to.into(), payload: payload.into() })
            .await;
    }

    pub async fn complete(&self) {
        let _ = self.commands.send(Command::Complete(self.handle.clone())).await;
    }

    pub async fn error(&self, detail: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::AgentError { agent: self.handle.clone(), detail: detail.into() })
            .await;
    }
}

/// Cheap, cloneable front door to a running [`Scheduler`]. The engine itself
/// runs on whatever task calls [`Scheduler::run`].
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    bus: Arc<Bus>,
    transcript: Arc<Transcript>,
}

impl SchedulerHandle {
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// A capability object bound to `handle`, safe to hand to an agent
    /// implementation at construction time.
    pub fn control_for(&self, handle: impl Into<AgentHandle>) -> AgentControl {
        AgentControl { handle: handle.into(), commands: self.commands.clone() }
    }

    /// Register `agent`. `veto_powers` lists proposal types this agent may
    /// unilaterally reject.
    pub async fn register(&self, agent: Agent, veto_powers: Vec<String>) {
        let _ = self.commands.send(Command::Register(agent, veto_powers)).await;
    }

    pub async fn unregister(&self, agent: impl Into<AgentHandle>) {
        let _ = self.commands.send(Command::Unregister(agent.into())).await;
    }

    pub async fn request_interrupt(&self, agent: impl Into<AgentHandle>, raw_priority: u8, payload: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::RequestInterrupt { agent: agent.into(), raw_priority, payload: payload.into() })
            .await;
    }

    pub async fn request_handoff(&self, to: impl Into<AgentHandle>, payload: impl Into<String>) {
        let _ = self.commands.send(Command::RequestHandoff { to: to.into(), payload: payload.into() }).await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_ballot(
        &self,
        proposal_type: impl Into<String>,
        content: impl Into<String>,
        proposer: impl Into<AgentHandle>,
        deadline: Instant,
        threshold: f64,
        minimum_participants: usize,
        weighted: bool,
    ) -> Option<ProposalId> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::StartBallot {
                proposal_type: proposal_type.into(),
                content: content.into(),
                proposer: proposer.into(),
                deadline,
                threshold,
                minimum_participants,
                weighted,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Start a ballot the way an external caller driven by configuration
    /// would: look `proposal_type` up in `quorum.rules` for its threshold,
    /// minimum participants, and vote deadline, falling back to
    /// `default_threshold` (the scheduler's own `quorum_default`, per spec
    /// §4.4's `QUORUM_DEFAULT`) and a single-voter minimum when no per-type
    /// rule is configured.
    pub async fn start_ballot_with_quorum(
        &self,
        proposal_type: impl Into<String>,
        content: impl Into<String>,
        proposer: impl Into<AgentHandle>,
        quorum: &crate::config::QuorumSection,
        default_threshold: f64,
        weighted: bool,
    ) -> Option<ProposalId> {
        let proposal_type = proposal_type.into();
        let rule = quorum.rules.get(&proposal_type);
        let threshold = rule.map_or(default_threshold, |r| r.threshold);
        let minimum_participants = rule.map_or(1, |r| r.minimum_participants);
        let vote_timeout = rule.map_or(Duration::from_secs(30), |r| Duration::from_secs(r.vote_timeout_sec));
        let deadline = Instant::now() + vote_timeout;
        self.start_ballot(proposal_type, content, proposer, deadline, threshold, minimum_participants, weighted)
            .await
    }

    pub async fn cast_vote(&self, proposal_id: ProposalId, agent: impl Into<AgentHandle>, choice: VoteChoice) -> Option<CastOutcome> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::CastVote { proposal_id, agent: agent.into(), choice, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.all().await
    }

    pub async fn transcript_since(&self, sequence: u64) -> Vec<TranscriptEntry> {
        self.transcript.since(sequence).await
    }
}

/// Roster entry bookkeeping the scheduler keeps alongside each [`Agent`].
struct Roster {
    agent: Agent,
    veto_powers: Vec<String>,
}

/// Snapshot of a muted roster, kept so a leader election can rejoin agents
/// at the tail in their original order once the exclusive rotation ends.
struct LeaderElection {
    leader: AgentHandle,
    muted: Vec<AgentHandle>,
    remaining_turns: u32,
}

/// Outcome of driving one speaker's slice to completion (or pre-emption).
enum SliceOutcome {
    Replied { reply: String, had_pending_interrupt: bool },
    TimedOut,
    Errored(String),
    Preempted { interrupter: AgentHandle, payload: String },
    Completed,
    Stopped,
}

/// The turn-taking engine. Owns Turn Queue, Interrupt Heap, Reputation
/// Ledger, Transcript, and the proposal table; everything else is reached
/// through `Arc` (Bus) or message passing (roster/interrupt/ballot
/// mutations from outside the running task).
pub struct Scheduler {
    config: SchedulerConfig,
    bus: Arc<Bus>,
    transcript: Arc<Transcript>,
    agents: HashMap<AgentHandle, Roster>,
    turn_queue: TurnQueue,
    interrupt_heap: InterruptHeap,
    reputation: ReputationLedger,
    proposals: HashMap<ProposalId, Proposal>,
    commands: mpsc::Receiver<Command>,
    seq: AtomicU64,
    start: Instant,
    /// Set by `Command::RequestHandoff`, consumed the next time its target
    /// becomes the speaker so the caller-supplied payload actually reaches
    /// the target's prompt, the same way an interrupt's payload does.
    pending_handoff: Option<(AgentHandle, String)>,
}

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const PREEMPTION_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> (Self, SchedulerHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let bus = Arc::new(Bus::default());
        let transcript = Arc::new(Transcript::new());
        let handle = SchedulerHandle {
            commands: command_tx.clone(),
            bus: Arc::clone(&bus),
            transcript: Arc::clone(&transcript),
        };
        let engine = Self {
            reputation: ReputationLedger::new(config.reputation_cooldown),
            config,
            bus,
            transcript,
            agents: HashMap::new(),
            turn_queue: TurnQueue::new(),
            interrupt_heap: InterruptHeap::new(),
            proposals: HashMap::new(),
            commands,
            seq: AtomicU64::new(0),
            start: Instant::now(),
            pending_handoff: None,
        };
        (engine, handle)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    fn monotonic_now(&self) -> u64 {
        Instant::now().saturating_duration_since(self.start).as_nanos() as u64
    }

    async fn emit(&self, sender: &str, kind: EventKind) {
        let seq = self.next_seq();
        let ts = self.monotonic_now();
        self.transcript.append(seq, sender, &kind, payload_text(&kind), None).await;
        let event = Event::new(sender, ts, seq, kind);
        self.bus.publish(GLOBAL_TOPIC, event).await;
    }


    /// Scans `text` for any configured interrupt keyword and, if found,
    /// auto-requests an interrupt at priority 95 on the agent's behalf.
    async fn maybe_auto_interrupt(&mut self, agent: &str, text: &str) {
        let lowered = text.to_lowercase();
        if self.config.interrupt_keywords.iter().any(|kw| lowered.contains(&kw.to_lowercase())) {
            let reputation = self.reputation.get(agent);
            let ts = self.monotonic_now();
            self.interrupt_heap.push(agent, 95, text.to_owned(), reputation, ts);
        }
    }

    fn active_roster_handles(&self) -> Vec<AgentHandle> {
        self.turn_queue.iter().cloned().collect()
    }

    async fn handle_command(&mut self, command: Command) -> Directive {
        match command {
            Command::Register(agent, veto_powers) => {
                let handle = agent.handle.clone();
                self.turn_queue.push_tail(handle.clone());
                self.agents.insert(handle, Roster { agent, veto_powers });
            }
            Command::Unregister(handle) => {
                self.turn_queue.remove(&handle);
                self.interrupt_heap.drain_for(&handle);
                self.agents.remove(&handle);
            }
            Command::RequestInterrupt { agent, raw_priority, payload } => {
                let reputation = self.reputation.get(&agent);
                let ts = self.monotonic_now();
                self.interrupt_heap.push(agent.clone(), raw_priority, payload.clone(), reputation, ts);
                self.emit(&agent, EventKind::Interrupt { priority: raw_priority, payload }).await;
            }
            Command::RequestHandoff { to, payload } => {
                self.turn_queue.remove(&to);
                self.turn_queue.push_head(to.clone());
                self.pending_handoff = Some((to.clone(), payload));
                self.emit(&to, EventKind::Handoff { target: to.clone() }).await;
            }
            Command::StartBallot {
                proposal_type,
                content,
                proposer,
                deadline,
                threshold,
                minimum_participants,
                weighted,
                reply,
            } => {
                let proposal = Proposal::new(
                    proposal_type,
                    content.clone(),
                    proposer.clone(),
                    threshold,
                    minimum_participants,
                    deadline,
                    weighted,
                );
                let id = proposal.id;
                self.proposals.insert(id, proposal);
                self.emit(&proposer, EventKind::Ballot { proposal_id: id, text: content }).await;
                let _ = reply.send(id);
            }
            Command::CastVote { proposal_id, agent, choice, reply } => {
                let outcome = self.cast_vote_internal(proposal_id, &agent, choice).await;
                let _ = reply.send(outcome);
            }
            Command::Complete(agent) => {
                self.emit(&agent, EventKind::Complete).await;
                return Directive::Complete;
            }
            Command::AgentError { agent, detail } => {
                self.reputation.adjust(&agent, DeltaKind::Error);
                self.emit(&agent, EventKind::Error { detail }).await;
            }
            Command::Stop => return Directive::Stop,
        }
        Directive::Continue
    }

    async fn cast_vote_internal(&mut self, proposal_id: ProposalId, agent: &str, choice: VoteChoice) -> CastOutcome {
        let has_veto = self
            .agents
            .get(agent)
            .map(|r| {
                self.proposals
                    .get(&proposal_id)
                    .map(|p| r.veto_powers.iter().any(|t| t == &p.proposal_type))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        let Some(proposal) = self.proposals.get_mut(&proposal_id) else {
            return CastOutcome::ProposalClosed;
        };
        let outcome = proposal.cast_vote(agent, choice, has_veto);
        if outcome == CastOutcome::Recorded {
            self.emit(agent, EventKind::Vote { proposal_id, choice }).await;
            let scores: HashMap<AgentHandle, f64> =
                self.agents.keys().map(|h| (h.clone(), self.reputation.peek(h))).collect();
            if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
                let status_before = proposal.status;
                proposal.retally(|a| scores.get(a).copied().unwrap_or(1.0));
                if proposal.status != status_before && proposal.status != ProposalStatus::Open {
                    let proposer = proposal.proposer.clone();
                    self.apply_ballot_reputation(proposal_id).await;
                    self.emit(
                        &proposer,
                        EventKind::Turn { payload: format!("BALLOT_RESULT {proposal_id} {:?}", self.proposals[&proposal_id].status) },
                    )
                    .await;
                }
            }
        }
        outcome
    }

    async fn apply_ballot_reputation(&mut self, proposal_id: ProposalId) {
        let Some(proposal) = self.proposals.get(&proposal_id) else { return };
        let approved = proposal.status == ProposalStatus::Approved;
        let blanket_delta = if approved { DeltaKind::ApprovedProposal } else { DeltaKind::RejectedProposal };
        let votes: Vec<(AgentHandle, VoteChoice)> = proposal.votes().map(|(a, c)| (a.clone(), *c)).collect();

        let handles: Vec<AgentHandle> = self.agents.keys().cloned().collect();
        for handle in handles {
            self.reputation.adjust(&handle, blanket_delta);
        }

        let winning_choice = if approved { VoteChoice::Approve } else { VoteChoice::Reject };
        for (voter, choice) in votes {
            let delta = if choice == winning_choice { DeltaKind::AgreementWithConsensus } else { DeltaKind::Disagreement };
            self.reputation.adjust(&voter, delta);
        }
    }

    /// Drain any open ballots past their deadline, marking them EXPIRED.
    fn expire_stale_ballots(&mut self) {
        let now = Instant::now();
        for proposal in self.proposals.values_mut() {
            if proposal.status == ProposalStatus::Open && proposal.deadline <= now {
                proposal.expire_if_open();
            }
        }
    }

    /// Run the scheduler loop until `stop()` is called, COMPLETE is
    /// received, or the roster empties.
    pub async fn run(mut self, initial_prompt: impl Into<String>) {
        let mut current_prompt = initial_prompt.into();
        let mut interrupt_depth: u32 = 0;
        let mut frozen_for_turns: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut election: Option<LeaderElection> = None;

        loop {
            // Drain any commands queued while we weren't mid-slice.
            while let Ok(command) = self.commands.try_recv() {
                match self.handle_command(command).await {
                    Directive::Continue => {}
                    Directive::Stop => {
                        self.shutdown().await;
                        return;
                    }
                    Directive::Complete => {
                        self.flush_interrupts_as_dropped().await;
                        self.shutdown().await;
                        return;
                    }
                }
            }
            self.expire_stale_ballots();

            if self.turn_queue.is_empty() {
                warn!("empty roster, stopping");
                self.emit("scheduler", EventKind::Error { detail: "empty-roster".into() }).await;
                self.shutdown().await;
                return;
            }

            let Some(speaker) = self.turn_queue.pop_head() else {
                continue;
            };
            // A handoff's payload becomes its target's next prompt, the same
            // way an interrupt's payload does (spec §4.4 step 8). If some
            // other agent ends up speaking first, leave the override in
            // place for whenever the target's turn actually comes around.
            if let Some((target, payload)) = self.pending_handoff.take() {
                if target == speaker {
                    current_prompt = format!("[HANDOFF] {payload}");
                } else {
                    self.pending_handoff = Some((target, payload));
                }
            }
            let outcome = self
                .run_slice(speaker.clone(), &mut current_prompt, &mut interrupt_depth, &mut frozen_for_turns)
                .await;

            match outcome {
                SliceOutcome::Replied { reply, had_pending_interrupt } => {
                    self.emit(&speaker, EventKind::Turn { payload: reply.clone() }).await;
                    self.turn_queue.push_tail(speaker.clone());
                    if !had_pending_interrupt {
                        interrupt_depth = 0;
                    }
                    consecutive_failures = 0;
                    self.maybe_auto_interrupt(&speaker, &reply).await;
                    current_prompt = reply;
                }
                SliceOutcome::TimedOut => {
                    self.reputation.adjust(&speaker, DeltaKind::Timeout);
                    self.emit(&speaker, EventKind::Error { detail: "timeout".into() }).await;
                    self.turn_queue.push_tail(speaker.clone());
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.failure_trigger && election.is_none() {
                        election = Some(self.begin_leader_election().await);
                    }
                }
                SliceOutcome::Errored(detail) => {
                    self.reputation.adjust(&speaker, DeltaKind::Error);
                    self.emit(&speaker, EventKind::Error { detail }).await;
                    self.turn_queue.push_tail(speaker.clone());
                }
                SliceOutcome::Preempted { interrupter, payload } => {
                    self.turn_queue.remove(&interrupter);
                    self.turn_queue.push_head(speaker);
                    self.turn_queue.push_head(interrupter);
                    current_prompt = format!("[INTERRUPT] {payload}");
                }
                SliceOutcome::Completed => {
                    self.emit(&speaker, EventKind::Complete).await;
                    self.flush_interrupts_as_dropped().await;
                    self.shutdown().await;
                    return;
                }
                SliceOutcome::Stopped => {
                    self.turn_queue.push_head(speaker);
                    self.shutdown().await;
                    return;
                }
            }

            let election_done = election.as_mut().is_some_and(|active| {
                active.remaining_turns = active.remaining_turns.saturating_sub(1);
                active.remaining_turns == 0
            });
            if election_done {
                if let Some(active) = election.take() {
                    self.end_leader_election(active);
                    consecutive_failures = 0;
                }
            }
            frozen_for_turns = frozen_for_turns.saturating_sub(1);
        }
    }

    /// Drive one speaker through dispatch, interrupt polling, and
    /// pre-emption, per spec §4.4 steps 3–4. `frozen_for_turns` persists
    /// across calls: it counts down one full turn per invocation while a
    /// livelock freeze (step 4b) is in effect.
    async fn run_slice(
        &mut self,
        speaker: AgentHandle,
        current_prompt: &mut String,
        interrupt_depth: &mut u32,
        frozen_for_turns: &mut u32,
    ) -> SliceOutcome {
        let prompt = current_prompt.clone();
        let cancel = CancellationToken::new();
        let agent_kind = match self.agents.get(&speaker) {
            Some(roster) => clone_kind(&roster.agent.kind),
            None => return SliceOutcome::Errored(format!("unknown speaker {speaker}")),
        };
        let slice_start = Instant::now();
        let deadline = slice_start + self.config.max_turn;
        let cancel_for_call = cancel.clone();
        let mut speak_fut =
            Box::pin(tokio::time::timeout_at(deadline.into(), agent_kind.speak(&prompt, cancel_for_call)));

        loop {
            tokio::select! {
                biased;

                result = &mut speak_fut => {
                    return match result {
                        Ok(Ok(reply)) => SliceOutcome::Replied {
                            reply,
                            had_pending_interrupt: !self.interrupt_heap.is_empty(),
                        },
                        Ok(Err(SpeakError::Cancelled)) => {
                            // Should not normally be observed: we stop
                            // awaiting speak_fut the moment we decide to
                            // pre-empt. Treat as an ordinary error.
                            SliceOutcome::Errored("cancelled".into())
                        }
                        Ok(Err(e)) => SliceOutcome::Errored(e.to_string()),
                        Err(_elapsed) => SliceOutcome::TimedOut,
                    };
                }

                Some(command) = self.commands.recv() => {
                    match self.handle_command(command).await {
                        Directive::Continue => {}
                        Directive::Stop => {
                            cancel.cancel();
                            return SliceOutcome::Stopped;
                        }
                        Directive::Complete => {
                            cancel.cancel();
                            return SliceOutcome::Completed;
                        }
                    }
                }

                _ = tokio::time::sleep(PREEMPTION_POLL_INTERVAL) => {}
            }

            if *frozen_for_turns > 0 {
                continue;
            }

            let elapsed = slice_start.elapsed();
            let should_consider = match self.interrupt_heap.peek() {
                Some(top) => elapsed >= self.config.min_slice || top.effective_priority >= self.config.preempt_threshold,
                None => false,
            };
            if !should_consider {
                continue;
            }

            *interrupt_depth += 1;
            if *interrupt_depth > self.config.max_interrupt_depth {
                *frozen_for_turns = self.active_roster_handles().len().max(1) as u32;
                // Scope the chain limit to one burst: without this reset the
                // depth stays above the threshold forever (nothing pops the
                // over-limit interrupter off the heap), so the very next
                // poll after the freeze thaws would immediately re-freeze.
                *interrupt_depth = 0;
                self.emit("scheduler", EventKind::Error { detail: "livelock-freeze".into() }).await;
                continue;
            }

            let Some(interrupter) = self.interrupt_heap.pop() else {
                continue;
            };
            cancel.cancel();
            *current_prompt = format!("[INTERRUPT] {}", interrupter.payload);
            return SliceOutcome::Preempted { interrupter: interrupter.agent, payload: interrupter.payload };
        }
    }

    async fn begin_leader_election(&mut self) -> LeaderElection {
        let roster = self.active_roster_handles();
        let leader = roster
            .iter()
            .max_by(|a, b| {
                self.reputation
                    .peek(a)
                    .partial_cmp(&self.reputation.peek(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.cmp(a)) // ties broken by lowest handle
            })
            .cloned()
            .unwrap_or_default();

        let muted: Vec<AgentHandle> = roster.into_iter().filter(|h| h != &leader).collect();
        for handle in &muted {
            self.turn_queue.remove(handle);
            self.interrupt_heap.drain_for(handle);
        }
        let remaining_turns = muted.len() as u32 + 1;
        info!(%leader, muted = muted.len(), "leader election triggered");
        LeaderElection { leader, muted, remaining_turns }
    }

    fn end_leader_election(&mut self, election: LeaderElection) {
        let mut reference = election.leader;
        for handle in election.muted {
            self.turn_queue.insert_after(&reference, handle.clone());
            reference = handle;
        }
    }

    async fn flush_interrupts_as_dropped(&mut self) {
        let drained = self.interrupt_heap.drain_all();
        for entry in drained {
            self.emit(&entry.agent, EventKind::Error { detail: "dropped-on-complete".into() }).await;
        }
    }

    async fn shutdown(&mut self) {
        for proposal in self.proposals.values_mut() {
            proposal.expire_if_open();
        }
        self.interrupt_heap.drain_all();
    }
}

fn clone_kind(kind: &AgentKind) -> AgentKind {
    match kind {
        AgentKind::LocalCallable(inner) => AgentKind::LocalCallable(Arc::clone(inner)),
        AgentKind::Simulated(inner) => AgentKind::Simulated(Arc::clone(inner)),
        AgentKind::RemoteEndpoint(inner) => AgentKind::RemoteEndpoint(inner.as_ref().map(Arc::clone)),
    }
}

fn payload_text(kind: &EventKind) -> String {
    match kind {
        EventKind::Turn { payload } | EventKind::Interrupt { payload, .. } => payload.clone(),
        EventKind::Handoff { target } => format!("handoff -> {target}"),
        EventKind::Complete => String::new(),
        EventKind::Error { detail } => detail.clone(),
        EventKind::Ballot { text, .. } => text.clone(),
        EventKind::Vote { choice, .. } => format!("{choice:?}"),
    }
}
