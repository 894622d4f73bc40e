use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    vstatus_config::StatusConfig,
    vstatus_sessions::SessionRegistry,
};

#[derive(Parser)]
#[command(name = "vstatus", about = "vstatus: verification session status push server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to load instead of the discovered one.
    #[arg(long, global = true, env = "VSTATUS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the status push server.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON.
    Show,
    /// Print the config directory searched after the working directory.
    Dir,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StatusConfig> {
    match &cli.config {
        Some(path) => vstatus_config::load_config(path),
        None => Ok(vstatus_config::discover_and_load()),
    }
}

/// Apply command-line overrides on top of the file config.
fn apply_overrides(
    mut config: StatusConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> StatusConfig {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "vstatus starting");

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Serve { bind, port } => {
            let config = apply_overrides(config, bind, port);
            let registry = Arc::new(SessionRegistry::new());
            vstatus_gateway::server::start_gateway(&config, registry).await
        },
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&config)?),
                ConfigAction::Dir => match vstatus_config::config_dir() {
                    Some(dir) => println!("{}", dir.display()),
                    None => eprintln!("no home directory found"),
                },
            }
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_overrides() {
        let cli =
            Cli::try_parse_from(["vstatus", "--json-logs", "serve", "--port", "9100"]).unwrap();
        assert!(cli.json_logs);
        let Commands::Serve { bind, port } = cli.command else {
            panic!("expected serve");
        };
        let config = apply_overrides(StatusConfig::default(), bind, port);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn overrides_leave_unset_fields() {
        let config = apply_overrides(StatusConfig::default(), Some("0.0.0.0".into()), None);
        assert_eq!(config.server.addr(), "0.0.0.0:8088");
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["vstatus", "config", "show", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
