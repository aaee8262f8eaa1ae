//! `dread`: play a session in the terminal.
//!
//! ```text
//! dread [CONFIG.toml]
//!
//! The `[story]` section picks mode, perspective, cluster, turn offset and
//! player profile; any `characters` descriptions are fleshed out by the
//! utility model before the first turn.
//!
//!   any text      act
//!   /auto N       let the autopilot take N turns
//!   /stop         stop the autopilot
//!   /save NAME    write a save to the configured database
//!   /export       print the character roster
//!   /quit
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dread_core::DreadConfig;
use dread_core::bootstrap::SessionConfig;
use dread_core::history::Role;
use dread_core::persistence::SaveStore;
use dread_engine::{
    Autopilot, EngineError, GameSession, RosterFormat, TurnOrchestrator, hydrate_roster,
    init_tracing,
};
use dread_llm::{ImageClient, LlmClient, LlmProvider, PromptEngine, RoleModels};
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_CONFIG: &str = "dread.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = if Path::new(&config_path).exists() {
        DreadConfig::from_file(Path::new(&config_path))
            .with_context(|| format!("reading {config_path}"))?
    } else {
        DreadConfig::default()
    };
    init_tracing(&config.general).context("installing tracing subscriber")?;
    tracing::info!(config = %config_path, provider = %config.llm.provider, "starting dread");

    let api_key = std::env::var(&config.llm.api_key_env).ok();
    let provider =
        LlmProvider::from_label(&config.llm.provider, &config.llm.base_url, api_key.clone())?;
    let models = RoleModels {
        simulation: config.llm.simulation_model.clone(),
        narration: config.llm.narration_model.clone(),
        utility: config.llm.utility_model.clone(),
    };
    let backend = Arc::new(
        LlmClient::new(provider, models, config.llm.max_retries)
            .with_request_timeout(config.llm.request_timeout_ms),
    );
    let orchestrator =
        TurnOrchestrator::new(backend, PromptEngine::builtin(), config.memory.clone());

    let story = &config.story;
    let roster = if story.characters.is_empty() {
        Vec::new()
    } else {
        println!("(bringing {} characters to life)", story.characters.len());
        hydrate_roster(&orchestrator, &story.characters, &story.cluster).await
    };

    let mut builder = GameSession::builder(orchestrator)
        .history(config.history.clone())
        .defaults(config.session.clone());
    if config.image.enabled {
        builder = builder.images(Arc::new(ImageClient::new(
            config.image.base_url.clone(),
            api_key,
            config.image.model.clone(),
            config.image.size.clone(),
            config.image.request_timeout_ms,
        )));
    }
    let session = builder.build();
    let autopilot = Autopilot::new(&session, &config.autopilot);

    let opening = session.initialize(&SessionConfig::from_story(story, roster));
    println!(
        "{} turns. {}",
        opening.meta.turn,
        opening
            .location_state
            .current_room()
            .map(|r| r.description.as_str())
            .unwrap_or_default()
    );
    print_suggestions(&session);

    let mut settled = session.subscribe();
    let mut printed = 0_i64;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                match input.split_once(' ').unwrap_or((input, "")) {
                    ("/quit", _) => break,
                    ("/stop", _) => autopilot.stop(),
                    ("/auto", n) => {
                        let cycles =
                            n.trim().parse().unwrap_or(config.autopilot.default_cycles);
                        autopilot.start(cycles);
                        println!("(autopilot: {cycles} turns)");
                    }
                    ("/save", name) => {
                        let store =
                            SaveStore::open(&config.persistence.path, &config.persistence)?;
                        let name = if name.trim().is_empty() { "quicksave" } else { name.trim() };
                        let record = session.save_record(name)?;
                        store.save(&record)?;
                        println!("(saved {} as {})", record.name, record.id);
                    }
                    ("/export", _) => {
                        println!("{}", session.export_roster(RosterFormat::Markdown)?);
                    }
                    _ => {
                        let session = session.clone();
                        let action = input.to_string();
                        tokio::spawn(async move { play(&session, &action).await });
                    }
                }
            }
            changed = settled.changed() => {
                if changed.is_err() {
                    break;
                }
                printed = print_new_messages(&session, printed);
            }
        }
    }

    autopilot.stop();
    Ok(())
}

async fn play(session: &GameSession, action: &str) {
    match session.submit_action(action, &[]).await {
        Ok(Some(_)) => {}
        Ok(None) => println!("(still working on the last turn)"),
        // Inference failures are already in the history.
        Err(EngineError::Inference { .. }) => {}
        Err(e) => println!("{}", e.user_message()),
    }
}

/// Print every message newer than `after`; returns the newest timestamp seen.
fn print_new_messages(session: &GameSession, after: i64) -> i64 {
    let mut newest = after;
    for message in session.history().iter().filter(|m| m.timestamp > after) {
        match message.role {
            Role::User => println!("> {}", message.text),
            Role::Model => {
                println!("\n{}\n", message.text);
                if let Some(state) = &message.snapshot {
                    println!("({} turns left)", state.meta.turn);
                    for action in &state.suggested_actions {
                        println!("  > {action}");
                    }
                }
            }
        }
        newest = newest.max(message.timestamp);
    }
    newest
}

fn print_suggestions(session: &GameSession) {
    if let Some(state) = session.state() {
        for action in &state.suggested_actions {
            println!("  > {action}");
        }
    }
}
