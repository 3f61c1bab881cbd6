// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command surface consumed from the CLI, per spec §6. Parsing never
//! fails: an unrecognized line becomes `Command::Unknown` so the caller can
//! emit a diagnostic outcome event without terminating the session.

/// Which agents `unfocus` should release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnfocusTarget {
    All,
    Ids(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Health,
    Focus(Vec<String>),
    Unfocus(UnfocusTarget),
    Dm { id: String, text: String },
    Group { name: String, text: String },
    Groups,
    Template { name: String, args: Vec<String> },
    Templates,
    Help,
    Quit,
    /// Broadcast prompt; restricted to focused agents if focus is non-empty.
    Broadcast(String),
    /// Anything that doesn't parse as a recognized command or argument list.
    Unknown(String),
}

/// Parse one input line into a [`Command`].
pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Broadcast(String::new());
    }

    let mut parts = trimmed.split_whitespace();
    let Some(head) = parts.next() else {
        return Command::Broadcast(trimmed.to_owned());
    };
    let rest: Vec<&str> = parts.collect();

    match head {
        "health" => Command::Health,
        "focus" if !rest.is_empty() => Command::Focus(rest.iter().map(|s| s.to_string()).collect()),
        "unfocus" if rest.len() == 1 && rest[0] == "all" => Command::Unfocus(UnfocusTarget::All),
        "unfocus" if !rest.is_empty() => Command::Unfocus(UnfocusTarget::Ids(rest.iter().map(|s| s.to_string()).collect())),
        "dm" if rest.len() >= 2 => Command::Dm { id: rest[0].to_owned(), text: rest[1..].join(" ") },
        "group" if rest.len() >= 2 => Command::Group { name: rest[0].to_owned(), text: rest[1..].join(" ") },
        "groups" => Command::Groups,
        "template" if !rest.is_empty() => {
            Command::Template { name: rest[0].to_owned(), args: rest[1..].iter().map(|s| s.to_string()).collect() }
        }
        "templates" => Command::Templates,
        "help" => Command::Help,
        "quit" => Command::Quit,
        _ if ["focus", "unfocus", "dm", "group", "template"].contains(&head) => {
            Command::Unknown(format!("{head}: missing arguments"))
        }
        _ => Command::Broadcast(trimmed.to_owned()),
    }
}
