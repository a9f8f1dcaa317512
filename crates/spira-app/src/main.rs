use anyhow::Result;
use spira_app::{parse_command_line, render_tree, App, ConsoleNotifier, DispatchOutcome};
use spira_config::ConfigStore;
use spira_domain::CoreError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_cli_flags()?;
    let config_path = match cli.config_path {
        Some(path) => path,
        None => spira_config::config_path_from_env()?,
    };
    let store = Arc::new(ConfigStore::open(&config_path)?);
    init_file_logging(&config_path)?;

    let app = App::new(store, Arc::new(ConsoleNotifier))?;
    let printer = spawn_tree_printer(&app);
    app.activate();
    println!("spira: watching assigned artifacts. Type 'help' for commands.");

    let result = run_console(&app).await;
    app.shutdown();
    printer.abort();
    result
}

async fn run_console(app: &App) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                eprintln!("{error}");
                continue;
            }
        };

        match app.dispatch(command) {
            Ok(DispatchOutcome::Output(text)) => {
                if !text.is_empty() {
                    println!("{text}");
                }
            }
            Ok(DispatchOutcome::Silent) => {}
            Ok(DispatchOutcome::Quit) => break,
            Err(error) => {
                tracing::warn!(error = %error, "console command failed");
                eprintln!("{error}");
            }
        }
    }
    Ok(())
}

fn spawn_tree_printer(app: &App) -> tokio::task::JoinHandle<()> {
    let tree = app.tree().clone();
    let mut changes = app.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(_) => println!("{}", render_tree(&tree)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "tree printer lagged behind change notifications");
                    println!("{}", render_tree(&tree));
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn init_file_logging(config_path: &Path) -> Result<(), CoreError> {
    let log_path = log_file_path(config_path);
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| {
                CoreError::Configuration(format!(
                    "failed to create spira log directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|error| {
            CoreError::Configuration(format!(
                "failed to open spira log file '{}': {error}",
                log_path.display()
            ))
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    Ok(())
}

fn log_file_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("spira.log")
}

#[derive(Debug, Default)]
struct CliFlags {
    config_path: Option<PathBuf>,
}

fn parse_cli_flags() -> Result<CliFlags, CoreError> {
    parse_cli_args(std::env::args().skip(1))
}

fn parse_cli_args(args: impl IntoIterator<Item = String>) -> Result<CliFlags, CoreError> {
    let mut flags = CliFlags::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().ok_or_else(|| {
                    CoreError::Configuration(
                        "Missing value after --config. Use --config <path>.".to_owned(),
                    )
                })?;
                if value.trim().is_empty() {
                    return Err(CoreError::Configuration(
                        "Flag '--config' requires a non-empty value.".to_owned(),
                    ));
                }
                flags.config_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                print_cli_help();
                std::process::exit(0);
            }
            value if value.starts_with("--") => {
                return Err(CoreError::Configuration(format!(
                    "Unknown flag '{value}'. Run with --help for valid flags."
                )));
            }
            unknown => {
                return Err(CoreError::Configuration(format!(
                    "Unexpected argument '{unknown}'. Run with --help for valid flags."
                )));
            }
        }
    }

    Ok(flags)
}

fn print_cli_help() {
    println!("Usage: spira [--config <path>]");
    println!();
    println!(
        "  --config <path>   Config file (default: $SPIRA_CONFIG or ~/.config/spira/config.toml)"
    );
    println!("  --help            Show this help message");
    println!();
    println!("{}", spira_app::HELP_TEXT);
}
