// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use parley::agent::{Agent, AgentKind, AgentHandle, Health, Speak, SpeakError};
use parley::beat::{BeatExecutor, Timeline};
use parley::command::{self, Command, UnfocusTarget};
use parley::config::Config;
use parley::scheduler::{Scheduler, SchedulerConfig};

/// A demo backing implementation: agents without a configured endpoint
/// speak by echoing their system prompt back, prefixed with their role.
/// Real model dispatch is the embedder's concern (out of scope; see §1).
struct EchoAgent {
    role: String,
}

#[async_trait]
impl Speak for EchoAgent {
    async fn speak(&self, prompt: &str, cancellation: CancellationToken) -> Result<String, SpeakError> {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            _ = cancellation.cancelled() => return Err(SpeakError::Cancelled),
        }
        Ok(format!("[{}] heard: {prompt}", self.role))
    }

    async fn health(&self) -> Health {
        Health::Healthy
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        error!("configuration error: {e}");
        std::process::exit(1);
    }
    if config.agents.is_empty() {
        error!("configuration error: no agents registered");
        std::process::exit(1);
    }

    let scheduler_config = config.scheduler.apply(SchedulerConfig::default());
    let (engine, handle) = Scheduler::new(scheduler_config);

    let mut direct_agents: std::collections::HashMap<AgentHandle, Arc<dyn Speak>> = std::collections::HashMap::new();
    for agent_config in &config.agents {
        let role = agent_config.role.clone();
        let backing = Arc::new(EchoAgent { role: role.clone() });
        direct_agents.insert(agent_config.id.clone(), backing.clone());
        let agent = Agent::new(agent_config.id.clone(), role, AgentKind::LocalCallable(backing));
        let veto = config
            .veto_powers
            .get(&agent_config.id)
            .cloned()
            .unwrap_or_default();
        handle.register(agent, veto).await;
    }

    let run_handle = handle.clone();
    let run_task = tokio::spawn(async move { engine.run("begin").await });

    let print_handle = handle.clone();
    let printer = tokio::spawn(async move {
        let sub = print_handle.bus().subscribe(parley::bus::GLOBAL_TOPIC).await;
        while let Some(event) = sub.recv().await {
            println!("{:?}", event);
        }
    });

    // Beat Executor: an alternative, deterministic front-end (spec §4.5).
    // It coexists with the priority scheduler above rather than replacing
    // it; `direction_ms` opts in since most interactive sessions never
    // populate a timeline. Entries are scheduled onto `timeline` by
    // whatever drives the deterministic run (tests, replay tooling) — the
    // CLI's own command surface has no "schedule" verb.
    let beat_task = config.beat.duration_ms.map(|ms| {
        let timeline = Arc::new(Timeline::new());
        let beat_handle = handle.clone();
        let shutdown = CancellationToken::new();
        let beat_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut executor = BeatExecutor::new(timeline, Duration::from_millis(ms));
            executor
                .start(beat_shutdown, |_beat, entry| {
                    let beat_handle = beat_handle.clone();
                    let direct_agents = direct_agents.clone();
                    async move { parley::beat::dispatch_entry(&entry, &beat_handle, &direct_agents).await }
                })
                .await;
        });
        (shutdown, task)
    });

    repl(&handle, &config).await;

    if let Some((shutdown, task)) = beat_task {
        shutdown.cancel();
        let _ = task.await;
    }
    run_handle.stop().await;
    let _ = run_task.await;
    printer.abort();

    let exit_code = handle
        .transcript()
        .await
        .iter()
        .filter(|e| e.kind == "ERROR")
        .map(|e| parley::error::classify(&e.payload).exit_code())
        .max()
        .unwrap_or(0);
    std::process::exit(exit_code);
}

fn load_config(path: Option<&str>) -> Result<Config, parley::error::ClassifiedError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                parley::error::ClassifiedError::new(
                    parley::error::FailureKind::Configuration,
                    format!("cannot read {path}: {e}"),
                )
            })?;
            Config::load_str(&text)
        }
        None => Ok(Config {
            agents: vec![parley::config::AgentConfig {
                id: "A".to_owned(),
                role: "assistant".to_owned(),
                endpoint: None,
                model: None,
                system_prompt: None,
                weight: None,
                required: false,
            }],
            ..Default::default()
        }),
    }
}

async fn repl(handle: &parley::scheduler::SchedulerHandle, config: &Config) {
    let mut focus: HashSet<String> = HashSet::new();
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        match command::parse(&line) {
            Command::Quit => break,
            Command::Help => println!(
                "commands: health, focus <ids...>, unfocus <ids...|all>, dm <id> <text>, group <name> <text>, groups, template <name> [args], templates, help, quit"
            ),
            Command::Health => println!("health: agent liveness probing is external; consult /healthz"),
            Command::Groups => {
                for (name, members) in &config.groups {
                    println!("{name}: {}", members.join(", "));
                }
            }
            Command::Templates => {
                for name in config.templates.keys() {
                    println!("{name}");
                }
            }
            Command::Focus(ids) => {
                focus.extend(ids);
                println!("focused: {}", focus.iter().cloned().collect::<Vec<_>>().join(", "));
            }
            Command::Unfocus(UnfocusTarget::All) => {
                focus.clear();
                println!("focus cleared");
            }
            Command::Unfocus(UnfocusTarget::Ids(ids)) => {
                for id in ids {
                    focus.remove(&id);
                }
            }
            Command::Dm { id, text } => {
                handle.request_interrupt(id, 60, text).await;
            }
            Command::Group { name, text } => {
                if let Some(members) = config.groups.get(&name) {
                    for member in members {
                        handle.request_interrupt(member.clone(), 60, text.clone()).await;
                    }
                } else {
                    println!("unknown group: {name}");
                }
            }
            Command::Template { name, args } => match config.render_template(&name, args.first().map(String::as_str).unwrap_or(""), args.get(1).map(String::as_str).unwrap_or("")) {
                Some(rendered) => handle.request_interrupt("user", 50, rendered).await,
                None => println!("unknown template: {name}"),
            },
            Command::Broadcast(text) if text.is_empty() => {}
            Command::Broadcast(text) if focus.is_empty() => {
                handle.request_interrupt("user", 50, text).await;
            }
            Command::Broadcast(text) => {
                for id in &focus {
                    handle.request_interrupt(id.clone(), 60, text.clone()).await;
                }
            }
            Command::Unknown(detail) => println!("unrecognized command: {detail}"),
        }
    }
    info!("repl closed");
}
