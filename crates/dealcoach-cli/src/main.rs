//! Dealcoach command-line entry point.
//!
//! `serve` runs the WebSocket server; `demo` drives a full scripted
//! conversation against the offline provider and prints the evaluation,
//! useful for a quick end-to-end check without any credentials.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dealcoach_engine::evaluation::skill_gaps_from_report;
use dealcoach_engine::{
    catalog, select_scenarios, Config, Evaluator, MemoryStore, PersistedSession, Phase,
    RoleplayService, SessionStatus, SessionStore,
};
use dealcoach_llm::LlmClient;
use dealcoach_server::{create_router, AppState};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dealcoach", version, about = "Sales roleplay training engine")]
struct Cli {
    /// Path to the configuration file (defaults to ./dealcoach.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the WebSocket roleplay server.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a scripted conversation offline and print the evaluation.
    Demo,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Serve { bind } => serve(cli.config.as_deref(), bind).await,
        Command::Demo => demo().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

async fn serve(config_path: Option<&Path>, bind: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let store = Arc::new(MemoryStore::new());
    seed_demo_sessions(&store);

    let service = RoleplayService::new(
        Arc::new(config.llm_client()),
        Arc::clone(&store) as Arc<dyn SessionStore>,
    )
    .with_max_turns_per_phase(config.max_turns_per_phase);

    let state = AppState::new(
        Arc::new(service),
        config.heartbeat_interval(),
        config.idle_timeout(),
    );
    let router = create_router(state);

    let bind_address = bind.unwrap_or(config.bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(provider = ?config.llm_provider, %bind_address, "dealcoach listening");

    axum::serve(listener, router)
        .await
        .context("server exited")?;
    Ok(())
}

/// Seeds one ready-to-join session per catalog scenario.
///
/// The in-memory store starts empty, so connecting clients need session ids
/// to exist; the ids are logged at startup.
fn seed_demo_sessions(store: &MemoryStore) {
    let user_id = Uuid::new_v4();
    for scenario in catalog::catalog() {
        let id = Uuid::new_v4();
        store.insert_session(PersistedSession {
            id,
            user_id,
            scenario_id: scenario.scenario_id.to_string(),
            status: SessionStatus::Created,
            current_phase: Phase::Greeting,
            turn_count: 0,
            snapshot: None,
            evaluation_summary: None,
        });
        tracing::info!(session_id = %id, scenario = scenario.scenario_id, "seeded session");
    }
}

/// Rep lines that walk the offline buyer from greeting to wrap-up.
const DEMO_TURNS: [&str; 6] = [
    "Hi, thanks for taking the time today! How has your quarter been going?",
    "Tell me about your current process, and walk me through how your team handles coaching today.",
    "What's your budget and timeline, and who else is the decision maker on this?",
    "Let's talk pricing and discount options for an annual package.",
    "What are the next steps to move forward? We're ready to sign and implement this quarter.",
    "Thank you! I'll send over the summary and follow up soon.",
];

async fn demo() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    store.insert_session(PersistedSession {
        id: session_id,
        user_id,
        scenario_id: "discovery_basics".to_string(),
        status: SessionStatus::Created,
        current_phase: Phase::Greeting,
        turn_count: 0,
        snapshot: None,
        evaluation_summary: None,
    });

    let llm = Arc::new(LlmClient::mock());
    let service = RoleplayService::new(
        Arc::clone(&llm),
        Arc::clone(&store) as Arc<dyn SessionStore>,
    );

    let scenario = catalog::scenario("discovery_basics")
        .context("demo scenario missing from catalog")?;
    println!("=== {} ({:?}) ===\n", scenario.name, scenario.difficulty);

    let phase = service.start_session(session_id).await?;
    println!("Session started in phase: {phase}\n");

    for turn in DEMO_TURNS {
        println!("REP: {turn}");
        let outcome = service.process_message(session_id, turn).await?;
        println!("BUYER [{}]: {}\n", outcome.phase, outcome.reply);
    }

    let summary = service.end_session(session_id).await?;
    println!(
        "Conversation over: {} turns, final phase {}\n",
        summary.total_turns,
        summary
            .final_phase
            .map_or("unknown", dealcoach_engine::Phase::as_str),
    );

    let transcript = store
        .messages_for(session_id)
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect::<Vec<_>>()
        .join("\n");

    let evaluator = Evaluator::new(llm);
    let outcome = evaluator.evaluate_transcript(&transcript).await?;
    let Some(report) = outcome.report else {
        println!("Evaluation could not be parsed; raw reply:\n{}", outcome.raw);
        return Ok(());
    };

    println!("=== Evaluation ===");
    println!("Overall score: {:.1}/10", report.overall_score);
    println!("Strengths:");
    for strength in &report.strengths {
        println!("  + {strength}");
    }
    println!("Weaknesses:");
    for weakness in &report.weaknesses {
        println!("  - {weakness}");
    }

    let gaps = skill_gaps_from_report(user_id, &report);
    println!("\nSkill gaps:");
    for gap in &gaps {
        println!("  {} ({}, score {:.1})", gap.skill_name, gap.severity, gap.score);
    }

    let recommendations = select_scenarios(&gaps, 3);
    println!("\nRecommended next scenarios:");
    for scenario in recommendations {
        println!("  {} - {}", scenario.scenario_id, scenario.name);
    }

    Ok(())
}
