use anyhow::Context;
use clap::{Parser, Subcommand};
use everpad_indicator::config::{Config, ConfigError};
use everpad_indicator::panic_handler;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "everpad-indicator")]
#[command(author, version, about = "Tray indicator for the everpad notes daemon", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indicator in the foreground (default)
    Run,

    /// Check whether everpad is on the session bus
    Status,

    /// Configure settings
    Config {
        /// Set the open-notes hotkey (e.g., "Super+E", "<Control><Alt>n")
        #[arg(long)]
        hotkey: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn init_logging(verbose: bool, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("everpad_indicator=debug,zbus=info")
        } else {
            EnvFilter::new(format!("everpad_indicator={},zbus=warn", level))
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    panic_handler::install();

    let cli = Cli::parse();
    let level = Config::peek()
        .map(|c| c.logging.level)
        .unwrap_or_else(|| "info".to_string());
    init_logging(cli.verbose, &level);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = Config::load().context("Failed to load config")?;
            info!("Starting everpad-indicator {}", env!("CARGO_PKG_VERSION"));
            run(config).await?;
        }

        Commands::Status => {
            status().await?;
        }

        Commands::Config { hotkey, show } => {
            let mut config = Config::load().context("Failed to load config")?;
            if let Some(hotkey) = hotkey {
                set_hotkey(&mut config, hotkey)?;
            }
            if show {
                show_config(&config)?;
            }
        }
    }

    Ok(())
}

fn set_hotkey(config: &mut Config, hotkey: String) -> Result<(), ConfigError> {
    config.hotkey.open_notes = hotkey;
    config.validate()?;
    config.save()?;
    println!("Hotkey set to {}", config.hotkey.open_notes);
    Ok(())
}

fn show_config(config: &Config) -> Result<(), ConfigError> {
    println!("# {}", Config::config_path()?.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(target_os = "linux")]
async fn run(config: Config) -> anyhow::Result<()> {
    everpad_indicator::daemon::run(config).await?;
    Ok(())
}

#[cfg(target_os = "linux")]
async fn status() -> anyhow::Result<()> {
    everpad_indicator::daemon::status().await?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("everpad-indicator needs a Linux session bus")
}

#[cfg(not(target_os = "linux"))]
async fn status() -> anyhow::Result<()> {
    println!("everpad is not running");
    Ok(())
}
