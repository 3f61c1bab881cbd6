// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration per spec §6. JSON parsing is a thin external-glue
//! wrapper (`load_str`); the structs and validation rules are the
//! in-scope surface.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ClassifiedError, FailureKind};

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub role: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub weight: Option<f64>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerSection {
    pub min_slice_ms: Option<u64>,
    pub max_turn_ms: Option<u64>,
    pub preempt_threshold: Option<f64>,
    pub max_interrupt_depth: Option<u32>,
    pub quorum_default: Option<f64>,
    #[serde(default)]
    pub interrupt_keywords: Vec<String>,
}

impl SchedulerSection {
    /// Layer this section's overrides onto `base`, leaving unset fields at
    /// their default.
    pub fn apply(&self, mut base: crate::scheduler::SchedulerConfig) -> crate::scheduler::SchedulerConfig {
        if let Some(ms) = self.min_slice_ms {
            base.min_slice = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_turn_ms {
            base.max_turn = std::time::Duration::from_millis(ms);
        }
        if let Some(t) = self.preempt_threshold {
            base.preempt_threshold = t;
        }
        if let Some(d) = self.max_interrupt_depth {
            base.max_interrupt_depth = d;
        }
        if let Some(q) = self.quorum_default {
            base.quorum_default = q;
        }
        if !self.interrupt_keywords.is_empty() {
            base.interrupt_keywords = self.interrupt_keywords.clone();
        }
        base
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeatSection {
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub slots: HashMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuorumRule {
    pub k: usize,
    pub n: usize,
    pub threshold: f64,
    pub minimum_participants: usize,
    pub vote_timeout_sec: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuorumSection {
    #[serde(default)]
    pub rules: HashMap<String, QuorumRule>,
}

/// Top-level recognized configuration, per spec §6's enumerated keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub templates: HashMap<String, String>,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub beat: BeatSection,
    #[serde(default)]
    pub quorum: QuorumSection,
    #[serde(default)]
    pub veto_powers: HashMap<String, Vec<String>>,
}

impl Config {
    /// Parse configuration from a JSON document. Loading the document off
    /// disk is the embedder's concern; this is the in-scope typed layer.
    pub fn load_str(json: &str) -> Result<Self, ClassifiedError> {
        serde_json::from_str(json)
            .map_err(|e| ClassifiedError::new(FailureKind::Configuration, format!("invalid config: {e}")))
    }

    /// Validate per spec §7's Configuration bucket: missing required
    /// fields, duplicate agent ids, and veto entries naming a proposal type
    /// with no quorum rule.
    pub fn validate(&self) -> Result<(), ClassifiedError> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.id.is_empty() {
                return Err(ClassifiedError::new(FailureKind::Configuration, "missing required field: agents[].id"));
            }
            if !seen.insert(agent.id.clone()) {
                return Err(ClassifiedError::new(
                    FailureKind::Configuration,
                    format!("duplicate agent id: {}", agent.id),
                ));
            }
        }
        for (agent_id, proposal_types) in &self.veto_powers {
            if !seen.contains(agent_id) {
                return Err(ClassifiedError::new(
                    FailureKind::Configuration,
                    format!("veto_powers references unknown agent: {agent_id}"),
                ));
            }
            for proposal_type in proposal_types {
                if !self.quorum.rules.contains_key(proposal_type) {
                    return Err(ClassifiedError::new(
                        FailureKind::Configuration,
                        format!("unknown proposal type in veto_powers: {proposal_type}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Render `name`'s template text, substituting `[TOPIC]` and
    /// `[SITUATION]` placeholders.
    pub fn render_template(&self, name: &str, topic: &str, situation: &str) -> Option<String> {
        self.templates
            .get(name)
            .map(|text| text.replace("[TOPIC]", topic).replace("[SITUATION]", situation))
    }
}
