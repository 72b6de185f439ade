//! `gateway` binary.

mod commands;

use clap::{Parser, Subcommand};
use commands::check::CheckArgs;
use commands::start::StartCommand;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gateway", version, about = "Expose databases as REST and MCP endpoints")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start one of the gateway transports.
    Start {
        #[command(subcommand)]
        cmd: StartCommand,
    },

    /// Load a configuration, resolve its connector and plugins, and ping the data source.
    Check(CheckArgs),

    /// List the registered plugin tags with their documentation.
    Plugins,

    /// List the registered connector tags with their documentation.
    Connectors,
}

impl Command {
    /// Stdio mode keeps stdout for JSON-RPC frames only.
    fn logs_to_stderr(&self) -> bool {
        matches!(
            self,
            Command::Start {
                cmd: StartCommand::Stdio(_)
            }
        )
    }
}

fn init_tracing(stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if stderr {
        builder.with_writer(std::io::stderr).with_ansi(false).init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.cmd.logs_to_stderr());

    match cli.cmd {
        Command::Start { cmd } => commands::start::run(cmd).await?,
        Command::Check(args) => commands::check::run(args).await?,
        Command::Plugins => commands::list::plugins(),
        Command::Connectors => commands::list::connectors(),
    }

    Ok(())
}
