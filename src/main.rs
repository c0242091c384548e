use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_resilience::cli::{CommandContext, OutputFormat, commands};

/// Parse output format from string
fn parse_output_format(s: &str) -> Result<OutputFormat, String> {
    s.parse::<OutputFormat>().map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "llm-resilience")]
#[command(
    version,
    about = "Inspect and manage circuit breaker state for LLM model calls"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of the global/project resolution chain
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show circuit state for every known model
    Status {
        #[arg(long, short, help = "Only show this model")]
        model: Option<String>,
        #[arg(long, short, default_value = "text", value_parser = parse_output_format)]
        format: OutputFormat,
    },

    /// Force a model's circuit back to CLOSED
    Reset {
        #[arg(help = "Model id to reset", required_unless_present = "all")]
        model: Option<String>,
        #[arg(long, help = "Reset every circuit that is not closed", conflicts_with = "model")]
        all: bool,
    },

    /// Show the fallback route starting at a model
    Chain {
        #[arg(help = "Model id the request starts at")]
        model: String,
        #[arg(long, short, default_value = "text", value_parser = parse_output_format)]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        #[arg(long, short, default_value = "text", value_parser = parse_output_format)]
        format: OutputFormat,
    },

    /// Show config file paths
    Path,

    /// Write a default config file
    Init {
        #[arg(long, help = "Write the global config instead of the project one")]
        global: bool,
        #[arg(long, short, help = "Overwrite an existing file")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mllm-resilience encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Status { model, format } => {
            let ctx = CommandContext::load(config_path)?;
            commands::status::run(&ctx, model.as_deref(), format)?;
        }
        Commands::Reset { model, all } => {
            let ctx = CommandContext::load(config_path)?;
            commands::reset::run(&ctx, model.as_deref(), all)?;
        }
        Commands::Chain { model, format } => {
            let ctx = CommandContext::load(config_path)?;
            commands::chain::run(&ctx, &model, format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let config = llm_resilience::cli::load_config(config_path)?;
                commands::config::show(&config, format)?;
            }
            ConfigAction::Path => commands::config::path(),
            ConfigAction::Init { global, force } => commands::config::init(global, force)?,
        },
    }

    Ok(())
}
