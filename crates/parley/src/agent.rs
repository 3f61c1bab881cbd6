// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registration and the `speak` capability.
//!
//! An agent is an opaque producer of text: it is handed a prompt and a
//! cancellation signal and must return a reply or fail. The scheduler never
//! inspects *how* an agent produces its reply — only whether it replied,
//! timed out, or errored.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Stable handle identifying an agent across the lifetime of the scheduler.
pub type AgentHandle = String;

/// Reasons a `speak` call can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakError {
    Timeout,
    Cancelled,
    Transport(String),
    Protocol(String),
}

impl fmt::Display for SpeakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Transport(detail) => write!(f, "transport error: {detail}"),
            Self::Protocol(detail) => write!(f, "protocol error: {detail}"),
        }
    }
}

impl std::error::Error for SpeakError {}

/// Liveness as reported by an agent's optional health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
    Unknown,
}

/// The capability every agent must expose: consume a prompt, produce a reply.
///
/// Cancellation is cooperative — implementations are expected to notice
/// `cancellation.is_cancelled()` (or await `cancellation.cancelled()`) and
/// return `SpeakError::Cancelled` promptly. A reply produced after
/// cancellation has already been observed by the scheduler is discarded.
#[async_trait]
pub trait Speak: Send + Sync {
    async fn speak(&self, prompt: &str, cancellation: CancellationToken) -> Result<String, SpeakError>;

    async fn health(&self) -> Health {
        Health::Unknown
    }
}

/// Dispatch-table variant of an agent's backing implementation, per the
/// capability-set design note: formalize duck-typed agents as a tagged
/// variant rather than a deep trait hierarchy.
pub enum AgentKind {
    /// An in-process closure — used by tests and scripted demo agents.
    LocalCallable(Arc<dyn Speak>),
    /// A scripted agent that replies from a fixed queue of canned lines,
    /// useful for deterministic scenario tests.
    Simulated(Arc<dyn Speak>),
    /// A remote model endpoint. The HTTP client itself is external glue (see
    /// the out-of-scope list); this variant exists so registration-time
    /// capability checks are real. Without a backing closure supplied by the
    /// embedder, `speak` always fails with `SpeakError::Transport`.
    RemoteEndpoint(Option<Arc<dyn Speak>>),
}

#[async_trait]
impl Speak for AgentKind {
    async fn speak(&self, prompt: &str, cancellation: CancellationToken) -> Result<String, SpeakError> {
        match self {
            Self::LocalCallable(inner) | Self::Simulated(inner) => {
                inner.speak(prompt, cancellation).await
            }
            Self::RemoteEndpoint(Some(inner)) => inner.speak(prompt, cancellation).await,
            Self::RemoteEndpoint(None) => Err(SpeakError::Transport(
                "no remote endpoint client configured".to_owned(),
            )),
        }
    }

    async fn health(&self) -> Health {
        match self {
            Self::LocalCallable(inner) | Self::Simulated(inner) => inner.health().await,
            Self::RemoteEndpoint(Some(inner)) => inner.health().await,
            Self::RemoteEndpoint(None) => Health::Unknown,
        }
    }
}

/// A registered participant in the turn-taking channel.
pub struct Agent {
    pub handle: AgentHandle,
    pub role: String,
    pub kind: AgentKind,
    /// Muted agents are excluded from the turn queue but remain registered.
    pub muted: bool,
}

impl Agent {
    pub fn new(handle: impl Into<AgentHandle>, role: impl Into<String>, kind: AgentKind) -> Self {
        Self { handle: handle.into(), role: role.into(), kind, muted: false }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("handle", &self.handle)
            .field("role", &self.role)
            .field("muted", &self.muted)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Speak for Echo {
        async fn speak(&self, prompt: &str, _cancellation: CancellationToken) -> Result<String, SpeakError> {
            Ok(format!("echo: {prompt}"))
        }
    }

    #[tokio::test]
    async fn local_callable_speaks() {
        let agent = AgentKind::LocalCallable(Arc::new(Echo));
        let reply = agent.speak("hi", CancellationToken::new()).await.unwrap();
        assert_eq!(reply, "echo: hi");
    }

    #[tokio::test]
    async fn remote_endpoint_without_client_fails_transport() {
        let agent = AgentKind::RemoteEndpoint(None);
        let err = agent.speak("hi", CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, SpeakError::Transport("no remote endpoint client configured".to_owned()));
    }

    #[tokio::test]
    async fn unknown_health_by_default() {
        let agent = AgentKind::RemoteEndpoint(None);
        assert_eq!(agent.health().await, Health::Unknown);
    }
}
