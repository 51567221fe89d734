use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use tftpc::logger;
use tftpc::tftp::{self, client::ClientConfig};

/// Lock-step TFTP (RFC 1350) client
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML file with default client settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a file from the server
    Get(TransferArgs),
    /// Upload a file to the server
    Put(TransferArgs),
}

#[derive(Args, Debug)]
struct TransferArgs {
    /// Server hostname or IP address
    server: String,

    /// File name on the server
    filename: String,

    /// Local path (defaults to the server file name)
    #[arg(long)]
    local: Option<PathBuf>,

    /// Server request port
    #[arg(short, long)]
    port: Option<u16>,

    /// Transfer mode (octet, netascii, mail)
    #[arg(short, long)]
    mode: Option<String>,

    /// Local UDP port (TID); random when omitted
    #[arg(short = 'l', long)]
    local_port: Option<u16>,

    /// Reply timeout, e.g. "10s" or "500ms"
    #[arg(short, long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Resends of the last packet after a timeout
    #[arg(short, long)]
    retries: Option<u32>,
}

impl TransferArgs {
    fn local_path(&self) -> PathBuf {
        self.local
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.filename))
    }

    fn into_config(self, base: ClientConfig) -> ClientConfig {
        base.merge_cli(
            self.server,
            self.port,
            self.local_port,
            self.mode,
            self.timeout,
            self.retries,
        )
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

async fn run(cli: Cli) -> Result<()> {
    let base = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    match cli.command {
        Command::Get(args) => {
            let local = args.local_path();
            let remote = args.filename.clone();
            let bytes = tftp::run_get(args.into_config(base), &remote, &local).await?;
            println!("{} bytes retrieved.", bytes);
        }
        Command::Put(args) => {
            let local = args.local_path();
            let remote = args.filename.clone();
            let bytes = tftp::run_put(args.into_config(base), &local, &remote).await?;
            println!("{} bytes written.", bytes);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let outcome = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("Transfer cancelled")),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("{:?}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_get_with_overrides() {
        let cli = Cli::try_parse_from([
            "tftpc",
            "-vv",
            "get",
            "10.0.0.5",
            "boot.img",
            "--local",
            "/tmp/boot.img",
            "-t",
            "500ms",
            "-r",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let Command::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.local_path(), PathBuf::from("/tmp/boot.img"));

        let config = args.into_config(ClientConfig::default());
        assert_eq!(config.server, "10.0.0.5");
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.retries, 2);
        assert_eq!(config.mode, "octet");
    }

    #[test]
    fn put_defaults_local_path_to_remote_name() {
        let cli = Cli::try_parse_from(["tftpc", "put", "server", "lab3.docx"]).unwrap();
        let Command::Put(args) = cli.command else {
            panic!("expected put");
        };
        assert_eq!(args.local_path(), PathBuf::from("lab3.docx"));
    }

    #[test]
    fn rejects_bad_usage() {
        assert!(Cli::try_parse_from(["tftpc", "get", "server"]).is_err());
        assert!(Cli::try_parse_from(["tftpc", "fetch", "server", "file"]).is_err());
        assert!(Cli::try_parse_from(["tftpc"]).is_err());
    }
}
