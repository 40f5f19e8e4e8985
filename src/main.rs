use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use ccengine::command::{check_snippet, template};
use ccengine::script::ResourceLimits;
use ccengine::{Config, ScriptEngine, TriggerType};

/// Authoring tools for guild custom commands.
#[derive(Parser)]
#[command(name = "ccengine", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Also append log lines to the configured log file.
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a snippet wrapped for a trigger type.
    Wrap {
        /// Trigger type, e.g. on_message or member_join.
        #[arg(short, long)]
        trigger: TriggerType,
        /// File holding the raw snippet.
        file: PathBuf,
    },
    /// Wrap a snippet, compile it and run the security scan.
    Check {
        #[arg(short, long)]
        trigger: TriggerType,
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_with_env(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", cli.config.display());
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // stdout carries the wrapped script, so logs go to stderr.
    if cli.log_file {
        if let Err(e) = ccengine::logging::init(&config.logging) {
            eprintln!("Failed to open {}: {e}", config.logging.file);
            return ExitCode::FAILURE;
        }
    } else {
        ccengine::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &Config) -> ccengine::Result<ExitCode> {
    match command {
        Commands::Wrap { trigger, file } => {
            let snippet = std::fs::read_to_string(&file)?;
            print!("{}", template::indent(&snippet, trigger.shape()));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { trigger, file } => {
            let snippet = std::fs::read_to_string(&file)?;
            if snippet.chars().count() > config.commands.max_code_length {
                warn!(
                    limit = config.commands.max_code_length,
                    "snippet is longer than the authoring limit"
                );
            }

            let engine = ScriptEngine::new(ResourceLimits::from(&config.engine));
            let name = file.display().to_string();
            let report = check_snippet(&engine, &name, &snippet, trigger.shape());
            for line in report.lines() {
                println!("{line}");
            }
            info!(
                trigger = %trigger,
                review_needed = report.scan.review_needed(),
                compiles = report.compile.is_ok(),
                "snippet checked"
            );
            if report.compile.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
