use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canvasflow::FlowError;
use canvasflow::cli::commands;

const FORMATS: [&str; 2] = ["text", "json"];

#[derive(Parser)]
#[command(name = "canvasflow")]
#[command(
    version,
    about = "Natural-language command orchestration for design canvases"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize canvasflow in the current directory
    Init {
        #[arg(long, short, help = "Reinitialize an existing project")]
        force: bool,
    },

    /// Create and inspect canvases
    Canvas {
        #[command(subcommand)]
        action: CanvasAction,
    },

    /// Run a natural-language command against a canvas
    ///
    /// Circuit-breaker and rate-limit state is held in memory for this one
    /// invocation only. Separate `exec` runs share no provider health, so
    /// limits and open circuits are not enforced across invocations.
    Exec {
        #[arg(help = "Command text, e.g. \"create 5 red rectangles\"")]
        text: String,
        #[arg(long, help = "Target canvas id")]
        canvas: String,
        #[arg(long, help = "Comma-separated ids of selected objects")]
        select: Option<String>,
        #[arg(short = 'f', long, default_value = "text", value_parser = FORMATS, help = "Output format: text, json")]
        format: String,
    },

    /// Show how a command would be classified
    Classify {
        text: String,
        #[arg(long, help = "Treat the command as issued with objects selected")]
        selected: bool,
        #[arg(short = 'f', long, default_value = "text", value_parser = FORMATS, help = "Output format: text, json")]
        format: String,
    },

    /// List the tools offered to providers
    Tools {
        #[arg(short = 'f', long, default_value = "text", value_parser = FORMATS, help = "Output format: text, json")]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CanvasAction {
    /// Create a new canvas
    Create {
        name: String,
        #[arg(short = 'f', long, default_value = "text", value_parser = FORMATS, help = "Output format: text, json")]
        format: String,
    },
    /// Show a canvas and its objects
    Show {
        id: String,
        #[arg(short = 'f', long, default_value = "text", value_parser = FORMATS, help = "Output format: text, json")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(short = 'f', long, default_value = "text", value_parser = FORMATS, help = "Output format: text, json")]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
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
        eprintln!("\x1b[31mcanvasflow encountered an unexpected error:\x1b[0m");
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
            eprintln!("\x1b[31mError:\x1b[0m {}", render_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Application errors render through their kind; the full chain goes to the debug log
fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<FlowError>() {
        Some(flow) => {
            tracing::debug!(kind = %flow.kind(), error = %flow, "Command failed");
            flow.public_message()
        }
        None => err.to_string(),
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Canvas { action } => {
            let rt = Runtime::new()?;
            match action {
                CanvasAction::Create { name, format } => {
                    rt.block_on(commands::canvas::create(&name, &format))?;
                }
                CanvasAction::Show { id, format } => {
                    rt.block_on(commands::canvas::show(&id, &format))?;
                }
            }
        }
        Commands::Exec {
            text,
            canvas,
            select,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::exec::run(commands::exec::ExecOptions {
                text: &text,
                canvas_id: &canvas,
                select: select.as_deref(),
                format: &format,
            }))?;
        }
        Commands::Classify {
            text,
            selected,
            format,
        } => {
            commands::classify::run(&text, selected, &format)?;
        }
        Commands::Tools { format } => {
            commands::tools::run(&format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                commands::config::show(global, &format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_help_states_state_scope() {
        let cli = Cli::command();
        let exec = cli.find_subcommand("exec").unwrap();
        let long_about = exec.get_long_about().unwrap().to_string();
        assert!(long_about.contains("this one invocation only"));
    }

    #[test]
    fn test_render_error_hides_provider_detail() {
        let err = anyhow::Error::from(FlowError::ProviderUnavailable {
            attempts: vec!["openai: HTTP 503: upstream connect error 10.0.0.3:443".into()],
        });
        let rendered = render_error(&err);
        assert!(!rendered.contains("10.0.0.3"));
        assert_eq!(
            rendered,
            canvasflow::ErrorKind::ProviderUnavailable.user_message()
        );

        let local = anyhow::Error::from(FlowError::CanvasNotFound("board-9".into()));
        assert!(render_error(&local).contains("board-9"));
    }
}
