

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mise::agent::{build_agent, CookingAgent, TurnReport, TurnStatus};
use mise::decision::ActionKind;
use mise::MiseConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Conversational cooking assistant: from a dish idea to an ordered pantry and a recipe
#[derive(Parser)]
#[command(name = "mise", version)]
struct Cli {
    /// Path to a configuration file (defaults to ./mise.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or resume a cooking session
    Cook {
        /// Session to resume (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Scripted user messages, fed before reading stdin
        #[arg(short, long = "message")]
        messages: Vec<String>,
    },
    /// List stored sessions
    Sessions,
    /// Print the stored state of a session as JSON
    Show {
        #[arg(short, long)]
        session: String,
    },
}

const EXIT_UNFINISHED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let default_directive = match cli.verbose {
        0 => "mise=info",
        1 => "mise=debug",
        _ => "mise=trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .init();

    let agent = match load_agent(cli.config.as_deref()) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            eprintln!("mise: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Cook { session, messages } => cook(&agent, session, messages).await,
        Commands::Sessions => list_sessions(&agent).await,
        Commands::Show { session } => show(&agent, &session).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("mise: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_agent(config_path: Option<&std::path::Path>) -> anyhow::Result<CookingAgent> {
    let config = MiseConfig::load(config_path).context("loading configuration")?;
    debug!("Using state dir {}", config.state_dir);
    if !config.email_configured() {
        eprintln!("note: no email API key set (MISE_EMAIL_API_KEY); orders cannot be confirmed by email");
    }
    Ok(build_agent(&config)?)
}

fn print_report(report: &TurnReport) {
    for message in &report.messages {
        println!("{message}\n");
    }
}

async fn cook(agent: &CookingAgent, session: Option<String>, messages: Vec<String>) -> anyhow::Result<ExitCode> {
    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    println!("Session {session_id}\n");

    let mut scripted = messages.into_iter();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let mut report = agent.handle_turn(&session_id, None).await?;
    print_report(&report);

    loop {
        match report.status {
            TurnStatus::Completed => return Ok(ExitCode::SUCCESS),
            TurnStatus::Stalled { action, attempts } => {
                println!("{}", stall_message(action, attempts, &session_id));
                return Ok(ExitCode::from(EXIT_UNFINISHED));
            }
            TurnStatus::AwaitingInput { .. } => {}
        }

        let line = match scripted.next() {
            Some(message) => {
                println!("> {message}\n");
                Some(message)
            }
            None => stdin.next_line().await.context("reading stdin")?,
        };

        let Some(line) = line else {
            println!("Input ended. Resume with: mise cook --session {session_id}");
            return Ok(ExitCode::from(EXIT_UNFINISHED));
        };

        report = agent.handle_turn(&session_id, Some(&line)).await?;
        print_report(&report);
    }
}

async fn list_sessions(agent: &CookingAgent) -> anyhow::Result<ExitCode> {
    let sessions = agent.sessions().await?;
    if sessions.is_empty() {
        println!("No sessions stored.");
        return Ok(ExitCode::SUCCESS);
    }

    for summary in sessions {
        println!(
            "{}  turns={:<3} {}  {}",
            summary.session_id,
            summary.turn_count,
            if summary.archived { "done  " } else { "active" },
            summary.dish_name.as_deref().unwrap_or("-")
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn show(agent: &CookingAgent, session_id: &str) -> anyhow::Result<ExitCode> {
    match agent.snapshot(session_id).await? {
        Some(state) => {
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("mise: no session named {session_id}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Zero attempts means the turn ran out of steps, not that a step failed.
fn stall_message(action: ActionKind, attempts: u32, session_id: &str) -> String {
    if attempts == 0 {
        format!(
            "Paused at {action}: this turn reached its step limit. \
             Resume with: mise cook --session {session_id}"
        )
    } else {
        format!(
            "Stopped at {action} after {attempts} failed attempts. \
             Resume later with: mise cook --session {session_id}"
        )
    }
}
