// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Beat Executor — a deterministic, tick-driven execution mode for replay,
//! offline simulation, and audit.
//!
//! A beat is a monotonic integer tick. A slot is a small integer with a
//! fixed semantic (housekeeping, routing, actions, logging, ping-window).
//! Within a beat, scheduled entries run in ascending slot order; within a
//! slot, in insertion order. The executor never fires a beat twice and
//! never skips one — under load it may run late, never out of order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{AgentHandle, Speak};
use crate::scheduler::SchedulerHandle;

pub type Beat = u64;
pub type Slot = u32;

/// A single scheduled entry: which agent, what payload, tagged with its slot.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub slot: Slot,
    pub agent: AgentHandle,
    pub payload: BeatPayload,
}

/// What a scheduled beat entry does when it fires.
#[derive(Debug, Clone)]
pub enum BeatPayload {
    /// Invoke the agent callback directly, bypassing the interrupt heap.
    Direct(String),
    /// Push an interrupt request into the scheduler's heap instead of
    /// invoking the agent directly (see spec §9's coexistence rule).
    Interrupt { raw_priority: u8, text: String },
}

/// Beat -> ordered list of (slot, agent, payload) entries.
#[derive(Default)]
pub struct Timeline {
    beats: RwLock<BTreeMap<Beat, Vec<TimelineEntry>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self { beats: RwLock::new(BTreeMap::new()) }
    }

    /// Insert an entry at `beat`. Entries at the same beat execute in
    /// ascending slot order; within a slot, insertion order — achieved by a
    /// stable sort keyed only on slot.
    pub async fn schedule(
        &self,
        beat: Beat,
        slot: Slot,
        agent: impl Into<AgentHandle>,
        payload: BeatPayload,
    ) {
        let mut beats = self.beats.write().await;
        let entries = beats.entry(beat).or_default();
        entries.push(TimelineEntry { slot, agent: agent.into(), payload });
        entries.sort_by_key(|e| e.slot);
    }

    /// Entries scheduled for `beat`, in execution order.
    pub async fn fetch(&self, beat: Beat) -> Vec<TimelineEntry> {
        self.beats.read().await.get(&beat).cloned().unwrap_or_default()
    }
}

/// Converts between wall time and tick index using a fixed start time and
/// duration, and drives ticks forward without ever skipping or repeating a
/// beat.
pub struct BeatExecutor {
    timeline: Arc<Timeline>,
    beat_duration: Duration,
    start: tokio::time::Instant,
    next_beat: Beat,
}

impl BeatExecutor {
    pub fn new(timeline: Arc<Timeline>, beat_duration: Duration) -> Self {
        Self { timeline, beat_duration, start: tokio::time::Instant::now(), next_beat: 0 }
    }

    /// Convert a wall-clock instant to the beat index it falls within.
    pub fn time_to_beat(&self, t: tokio::time::Instant) -> Beat {
        let elapsed = t.saturating_duration_since(self.start);
        (elapsed.as_nanos() / self.beat_duration.as_nanos().max(1)) as Beat
    }

    /// Convert a beat index to the wall-clock instant it starts at.
    pub fn beat_to_time(&self, beat: Beat) -> tokio::time::Instant {
        self.start + self.beat_duration * u32::try_from(beat).unwrap_or(u32::MAX)
    }

    /// Run the tick loop, invoking `on_entry` for each timeline entry in
    /// strict beat-then-slot order, until cancelled.
    pub async fn start<F, Fut>(&mut self, shutdown: CancellationToken, mut on_entry: F)
    where
        F: FnMut(Beat, TimelineEntry) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            let target = self.beat_to_time(self.next_beat);
            tokio::select! {
                _ = tokio::time::sleep_until(target) => {}
                _ = shutdown.cancelled() => return,
            }

            let beat = self.next_beat;
            let entries = self.timeline.fetch(beat).await;
            debug!(beat, count = entries.len(), "beat firing");
            for entry in entries {
                on_entry(beat, entry).await;
            }
            self.next_beat += 1;
        }
    }
}

/// Dispatch one fired timeline entry per spec §9's coexistence rule:
/// `Interrupt` entries go through the scheduler's normal priority path,
/// `Direct` entries invoke the named agent's callback directly, bypassing
/// the heap entirely. `direct_agents` is the executor's own registry of
/// callbacks — separate from the scheduler's, since a direct dispatch by
/// definition never goes through it.
pub async fn dispatch_entry(
    entry: &TimelineEntry,
    scheduler: &SchedulerHandle,
    direct_agents: &HashMap<AgentHandle, Arc<dyn Speak>>,
) {
    match &entry.payload {
        BeatPayload::Interrupt { raw_priority, text } => {
            scheduler.request_interrupt(entry.agent.clone(), *raw_priority, text.clone()).await;
        }
        BeatPayload::Direct(prompt) => {
            if let Some(agent) = direct_agents.get(&entry.agent) {
                let _ = agent.speak(prompt, CancellationToken::new()).await;
            } else {
                debug!(agent = %entry.agent, "direct beat entry has no registered callback");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentKind, Health, SpeakError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[tokio::test]
    async fn fetch_returns_ascending_slot_order() {
        let timeline = Timeline::new();
        timeline.schedule(5, 1, "Otto", BeatPayload::Direct("route(@Arc cool)".into())).await;
        timeline.schedule(6, 2, "Arc", BeatPayload::Direct("start(mode=cool,temp=68F)".into())).await;
        timeline.schedule(6, 3, "Clarity", BeatPayload::Direct("log(...)".into())).await;

        let entries = timeline.fetch(6).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].agent, "Arc");
        assert_eq!(entries[1].agent, "Clarity");
    }

    #[tokio::test]
    async fn insertion_order_preserved_within_a_slot() {
        let timeline = Timeline::new();
        timeline.schedule(0, 0, "first", BeatPayload::Direct("a".into())).await;
        timeline.schedule(0, 0, "second", BeatPayload::Direct("b".into())).await;
        let entries = timeline.fetch(0).await;
        assert_eq!(entries[0].agent, "first");
        assert_eq!(entries[1].agent, "second");
    }

    #[tokio::test]
    async fn empty_beat_fetch_is_empty() {
        let timeline = Timeline::new();
        assert!(timeline.fetch(42).await.is_empty());
    }

    #[test]
    fn time_to_beat_round_trips() {
        let timeline = Arc::new(Timeline::new());
        let executor = BeatExecutor::new(timeline, Duration::from_millis(500));
        for b in [0u64, 1, 2, 10, 100] {
            let t = executor.beat_to_time(b);
            assert_eq!(executor.time_to_beat(t), b);
        }
    }

    struct Echo;

    #[async_trait]
    impl Speak for Echo {
        async fn speak(&self, prompt: &str, _cancellation: CancellationToken) -> Result<String, SpeakError> {
            Ok(prompt.to_owned())
        }

        async fn health(&self) -> Health {
            Health::Healthy
        }
    }

    /// Spec §9's coexistence rule, the `Interrupt` half: a fired beat entry
    /// reaches the scheduler's priority path, not a direct agent callback.
    #[tokio::test]
    async fn interrupt_entry_dispatches_into_scheduler_heap() {
        let (engine, handle) = crate::scheduler::Scheduler::new(crate::scheduler::SchedulerConfig::default());
        handle.register(Agent::new("A", "r", AgentKind::LocalCallable(Arc::new(Echo))), vec![]).await;
        let run = tokio::spawn(engine.run("begin"));

        let entry = TimelineEntry {
            slot: 0,
            agent: "A".into(),
            payload: BeatPayload::Interrupt { raw_priority: 80, text: "beat-interrupt".into() },
        };
        dispatch_entry(&entry, &handle, &HashMap::new()).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;
        let _ = run.await;

        let transcript = handle.transcript().await;
        assert!(transcript.iter().any(|e| e.kind == "INTERRUPT" && e.payload == "beat-interrupt"));
    }

    /// Spec §9's coexistence rule, the `Direct` half: a fired beat entry
    /// invokes the registered callback directly and never touches the
    /// scheduler's interrupt heap or transcript.
    #[tokio::test]
    async fn direct_entry_invokes_agent_without_touching_scheduler() {
        let (engine, handle) = crate::scheduler::Scheduler::new(crate::scheduler::SchedulerConfig::default());
        handle.register(Agent::new("A", "r", AgentKind::LocalCallable(Arc::new(Echo))), vec![]).await;
        let run = tokio::spawn(engine.run("begin"));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        struct Recording(Arc<Mutex<Vec<String>>>);

        #[async_trait]
        impl Speak for Recording {
            async fn speak(&self, prompt: &str, _cancellation: CancellationToken) -> Result<String, SpeakError> {
                self.0.lock().expect("lock poisoned").push(prompt.to_owned());
                Ok(prompt.to_owned())
            }

            async fn health(&self) -> Health {
                Health::Healthy
            }
        }

        let mut direct_agents: HashMap<AgentHandle, Arc<dyn Speak>> = HashMap::new();
        direct_agents.insert("A".to_owned(), Arc::new(Recording(seen.clone())));

        let entry = TimelineEntry { slot: 0, agent: "A".into(), payload: BeatPayload::Direct("direct-prompt".into()) };
        dispatch_entry(&entry, &handle, &direct_agents).await;

        handle.stop().await;
        let _ = run.await;

        assert_eq!(seen.lock().expect("lock poisoned").as_slice(), ["direct-prompt"]);
        let transcript = handle.transcript().await;
        assert!(!transcript.iter().any(|e| e.kind == "INTERRUPT"));
    }
}
