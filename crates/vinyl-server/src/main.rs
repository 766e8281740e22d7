//! Vinyl album service daemon.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use vinyl_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use vinyl_server::{Server, VERSION};
use vinyl_telemetry::init_logging;

/// What the command line asked for.
enum Command {
    Run { config: Option<PathBuf> },
    Help,
    Version,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Command> {
    let mut args = args.into_iter();
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            "--help" | "-h" => return Ok(Command::Help),
            "--version" | "-V" => return Ok(Command::Version),
            other => bail!("unknown argument: {other}\nUse --help for usage information"),
        }
    }

    Ok(Command::Run { config })
}

fn print_help() {
    println!(
        r"vinyld - album catalog service with per-client rate limiting

USAGE:
    vinyld [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    VINYL__SERVER__HTTP_ADDR                 Bind address (default: 127.0.0.1:8080)
    VINYL__SERVER__MAX_BODY_BYTES            Largest accepted request body (default: 1048576)
    VINYL__RATE_LIMIT__ENABLED               Enable rate limiting (default: true)
    VINYL__RATE_LIMIT__WINDOW_SECS           Quiet period that resets a client (default: 15)
    VINYL__RATE_LIMIT__THRESHOLD             Requests allowed per window (default: 5)
    VINYL__RATE_LIMIT__KEY                   peer_ip | forwarded_for | global
    VINYL__METRICS__BACKEND                  Metrics store backend (default: memory)
    VINYL__METRICS__SNAPSHOT_INTERVAL_SECS   Seconds between snapshot saves (default: 60)
    VINYL__LOGGING__LEVEL                    Log filter (default: info)
    VINYL__LOGGING__FORMAT                   json | pretty

A .env file in the working directory is loaded before the environment is read."
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = match parse_args(std::env::args().skip(1))? {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Version => {
            println!("vinyld {VERSION}");
            return Ok(());
        }
        Command::Run { config } => config,
    };

    let mut loader = ConfigLoader::new().with_dotenv()?;
    if let Some(path) = &config_path {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }
    let config = loader
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    init_logging(&config.logging.to_log_config()).context("failed to initialize logging")?;

    info!(version = VERSION, config = ?config_path, "starting vinyld");

    let server = Server::from_config(config).context("failed to build server")?;
    server.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_no_args_runs_with_defaults() {
        assert!(matches!(parse_args(args(&[])).unwrap(), Command::Run { config: None }));
    }

    #[test]
    fn test_config_flag() {
        match parse_args(args(&["--config", "/etc/vinyl.toml"])).unwrap() {
            Command::Run { config } => assert_eq!(config, Some(PathBuf::from("/etc/vinyl.toml"))),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_help_and_version() {
        assert!(matches!(parse_args(args(&["-h"])).unwrap(), Command::Help));
        assert!(matches!(parse_args(args(&["--version"])).unwrap(), Command::Version));
    }

    #[test]
    fn test_missing_config_path() {
        assert!(parse_args(args(&["--config"])).is_err());
    }

    #[test]
    fn test_unknown_argument() {
        let err = parse_args(args(&["--verbose"])).err().unwrap();
        assert!(err.to_string().contains("--verbose"));
    }
}
