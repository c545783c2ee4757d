//! chatstream CLI
//!
//! Terminal front end for the streaming session client.

mod logging;
mod paths;
mod render;
mod repl;

use std::path::PathBuf;

use anyhow::Context;
use chatstream_client::{ChatClient, ClientConfig};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::paths::DataPaths;

#[derive(Debug, Parser)]
#[command(name = "chatstream", version, about = "Chat with the inference backend from the terminal")]
struct Cli {
    /// Backend WebSocket URL (overrides config and CHATSTREAM_URL)
    #[arg(long)]
    url: Option<String>,

    /// Session to open (overrides config and CHATSTREAM_SESSION)
    #[arg(long)]
    session: Option<String>,

    /// Generation mode sent with each message
    #[arg(long)]
    mode: Option<String>,

    /// Config file
    #[arg(long, env = "CHATSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (default: ~/.chatstream)
    #[arg(long, env = "CHATSTREAM_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Completions { shell }) = cli.command {
        generate(shell, &mut Cli::command(), "chatstream", &mut std::io::stdout());
        return Ok(());
    }

    let paths = DataPaths::resolve(cli.data_dir.as_deref())?;
    paths
        .ensure_dirs()
        .with_context(|| format!("creating data dir {}", paths.root().display()))?;
    let logging = logging::init_logging(&paths.log_dir())?;

    let config = load_config(&cli, &paths)?;
    info!(
        component = "cli",
        event = "cli.starting",
        run_id = %logging.run_id,
        url = %config.url,
        session_id = %config.session_id,
        mode = %config.mode,
        "Starting chatstream"
    );

    let client = ChatClient::connect(&config);
    let result = repl::run(client.clone()).await;
    client.shutdown().await;

    info!(component = "cli", event = "cli.exit", "Exiting");
    drop(logging);
    result
}

/// File (or defaults), then env overrides, then flags.
fn load_config(cli: &Cli, paths: &DataPaths) -> anyhow::Result<ClientConfig> {
    let mut config = match paths.config_source(cli.config.as_deref())? {
        Some(path) => ClientConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(session) = &cli.session {
        config.session_id = session.clone();
    }
    if let Some(mode) = &cli.mode {
        config.mode = mode.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = DataPaths::resolve(Some(dir.path())).expect("paths");
        std::fs::write(
            paths.config_path(),
            "url = \"ws://file.test/ws\"\nmode = \"agent\"\n",
        )
        .expect("write");

        let cli = Cli::parse_from(["chatstream", "--url", "wss://flag.test/ws"]);
        let config = load_config(&cli, &paths).expect("config");
        assert_eq!(config.url, "wss://flag.test/ws");
        assert_eq!(config.mode, "agent");
    }

    #[test]
    fn flag_rescues_invalid_file_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = DataPaths::resolve(Some(dir.path())).expect("paths");
        std::fs::write(paths.config_path(), "url = \"http://old\"\n").expect("write");

        let cli = Cli::parse_from(["chatstream", "--url", "ws://ok/ws"]);
        let config = load_config(&cli, &paths).expect("config");
        assert_eq!(config.url, "ws://ok/ws");

        let without_flag = Cli::parse_from(["chatstream"]);
        assert!(load_config(&without_flag, &paths).is_err());
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = DataPaths::resolve(Some(dir.path())).expect("paths");
        let cli = Cli::parse_from(["chatstream", "--url", "http://nope"]);
        assert!(load_config(&cli, &paths).is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
