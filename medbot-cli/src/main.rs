// medbot-cli/src/main.rs
mod models;
mod rendering;
mod setup;

use anyhow::{anyhow, Context, Result};
use colored::*;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use medbot_core::{ingest, tools::medical_tool_definitions, Conversation, TurnObserver};

use crate::models::cli::{Cli, Commands};
use crate::rendering::format_answer;
use crate::setup::{build_conversation, load_cli_config, resolve_credentials, LoadedConfig};

const LOG_FILE_NAME: &str = "medbot.log";
const APP_DIR_NAME: &str = "medbot";
const PROMPT: &str = "You: ";

/// Prints tool notices above the spinner of the turn in progress.
#[derive(Default)]
struct CliObserver {
    spinner: Mutex<Option<ProgressBar>>,
}

impl CliObserver {
    fn start_turn(&self) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-"]));
        }
        pb.set_message("Thinking...");
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(pb.clone());
        }
        pb
    }

    fn end_turn(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl TurnObserver for CliObserver {
    fn tool_called(&self, tool_name: &str) {
        let notice = format!("> Calling tool: {}...", tool_name);
        match self.spinner.lock().ok().and_then(|slot| slot.clone()) {
            Some(pb) => pb.println(notice.dimmed().to_string()),
            None => println!("{}", notice.dimmed()),
        }
    }
}

fn is_exit_command(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("exit")
}

/// What the REPL does with one line read at the prompt.
#[derive(Debug, PartialEq)]
enum ReplAction<'a> {
    Exit,
    Submit(&'a str),
}

/// Everything other than `exit` is a user turn, blank lines included.
fn next_action(line: &str) -> ReplAction<'_> {
    if is_exit_command(line) {
        ReplAction::Exit
    } else {
        ReplAction::Submit(line.trim())
    }
}

fn print_welcome_message() {
    println!(
        "\n{}",
        "Multi-Tool Medical Agent with Fallback LLM Ready!".cyan().bold()
    );
    println!("{}", "Type 'exit' to quit.".dimmed());
    println!();
}

fn app_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Runs a single turn (non-interactive).
async fn run_single_turn(
    question: &str,
    mut conversation: Conversation,
    observer: Arc<CliObserver>,
    markdown: bool,
) -> Result<()> {
    info!(question = %question, "Running non-interactive turn.");
    observer.start_turn();
    let result = conversation.submit(question).await;
    observer.end_turn();

    let output = result.map_err(|e| anyhow!(e))?;
    println!("{}", format_answer(&output.final_answer, markdown));
    Ok(())
}

/// Runs an interactive chat session using rustyline for a REPL experience.
async fn run_interactive(
    mut conversation: Conversation,
    observer: Arc<CliObserver>,
    markdown: bool,
) -> Result<()> {
    print_welcome_message();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl = DefaultEditor::with_config(rl_config)?;

    let history_dir = app_cache_dir();
    fs::create_dir_all(&history_dir).context("Failed to create history directory")?;
    let history_file_path = history_dir.join("cli_history.txt");
    if rl.load_history(&history_file_path).is_err() {
        debug!(path = %history_file_path.display(), "No previous CLI history found or error loading.");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let input = match next_action(&line) {
                    ReplAction::Exit => {
                        info!("Exit command entered, exiting interactive mode.");
                        break;
                    }
                    ReplAction::Submit(input) => input,
                };

                observer.start_turn();
                let outcome = tokio::select! {
                    result = conversation.submit(input) => Some(result),
                    _ = tokio::signal::ctrl_c() => None,
                };
                observer.end_turn();

                match outcome {
                    Some(Ok(output)) => {
                        println!("{}", format_answer(&output.final_answer, markdown));
                    }
                    Some(Err(e)) => {
                        error!("Turn failed: {}", e);
                        eprintln!("{} {}", "Error:".red(), e);
                    }
                    None => {
                        info!("Interrupted while a turn was running, exiting.");
                        println!("{}", "^C".yellow());
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                info!("Ctrl-C at the prompt, exiting interactive mode.");
                println!("{}", "^C".yellow());
                break;
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, exiting interactive mode.");
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history_file_path) {
        warn!(path = %history_file_path.display(), error = %e, "Failed to save CLI history.");
    } else {
        debug!(path = %history_file_path.display(), "Saved CLI history.");
    }
    Ok(())
}

fn handle_ingest(loaded: &LoadedConfig, data_dir: PathBuf, db_dir: Option<PathBuf>) -> Result<()> {
    let db_dir = db_dir.unwrap_or_else(|| loaded.dataset_dir());
    info!(data_dir = %data_dir.display(), db_dir = %db_dir.display(), "Ingesting datasets.");
    for (dataset, path, rows) in ingest::ingest_all(&data_dir, &db_dir)? {
        println!(
            "{} {} rows -> {}",
            format!("[{}]", dataset).cyan(),
            rows,
            path.display()
        );
    }
    Ok(())
}

fn handle_list_tools(json: bool) -> Result<()> {
    let definitions = medical_tool_definitions();
    if json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }
    println!("\n{}", "Available tools:".bold());
    for definition in &definitions {
        println!("  {:<20} {}", definition.name.green(), definition.description.dimmed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    colored::control::set_override(true);

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // --- Logging Setup ---
    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let log_dir = app_cache_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("{} Failed to create log directory {}: {}", "Error:".red(), log_dir.display(), e);
        return ExitCode::FAILURE;
    }
    let log_path = log_dir.join(LOG_FILE_NAME);
    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let local_timer = LocalTime::new(time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));
    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_timer(local_timer.clone());
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(local_timer)
        .with_target(false)
        .with_level(true);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("{} Failed to initialize logging: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }
    colored::control::unset_override();

    info!(
        "Logging initialized. Level determined by RUST_LOG or -v flags (default: {}). Logging to stderr and {}",
        default_level,
        log_path.display()
    );
    // --- End Logging Setup ---

    let loaded = match load_cli_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("{} Could not load configuration: {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Commands::Ingest { data_dir, db_dir }) => handle_ingest(&loaded, data_dir, db_dir),
        Some(Commands::Tools { json }) => handle_list_tools(json),
        None => {
            let credentials = match resolve_credentials(&loaded.config) {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!("Failed to resolve credentials: {}", e);
                    eprintln!("{} {}", "Error:".red(), e);
                    return ExitCode::FAILURE;
                }
            };
            let observer = Arc::new(CliObserver::default());
            match build_conversation(&loaded, credentials, observer.clone()) {
                Ok((conversation, _registry)) => match cli.turn {
                    Some(question) => {
                        run_single_turn(&question, conversation, observer, cli.markdown).await
                    }
                    None => run_interactive(conversation, observer, cli.markdown).await,
                },
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Operation failed: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}
