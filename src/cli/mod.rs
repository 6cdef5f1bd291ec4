pub mod control;
pub mod daemon_path;
pub mod edit;
pub mod output;
pub mod process;
pub mod report;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use edit::{process_clear_command, process_import_command, ClearCommand, ImportCommand};
use process::{daemon_executable, restart_daemon, signal_daemons, stop_daemons};
use report::{
    process_export_command, process_log_command, process_status_command, ExportCommand,
    LogCommand,
};
use sysinfo::Signal;
use tracing::level_filters::LevelFilter;

use crate::{
    config::ConfigSource,
    daemon::start_daemon,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "worktally", version, long_about = None)]
#[command(about = "Tracks time spent in your workspaces and git branches", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Print logs to the console")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default $XDG_STATE_HOME/worktally or $HOME/.local/state/worktally"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application, replacing a running one")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for debugging, stop it with Ctrl-C"
    )]
    Serve {},
    #[command(about = "Stop currently running daemon. Tracked time is saved first")]
    Stop {},
    #[command(about = "Pause or resume tracking")]
    Toggle {},
    #[command(about = "Write tracked time to the disk right away")]
    Save {},
    #[command(about = "Show tracked totals")]
    Status {
        #[arg(long, help = "Print the raw status report")]
        json: bool,
    },
    #[command(about = "Show tracked time per day")]
    Log {
        #[command(flatten)]
        command: LogCommand,
    },
    #[command(about = "Print intervals as JSON")]
    Export {
        #[command(flatten)]
        command: ExportCommand,
    },
    #[command(about = "Remove every interval of a year")]
    Clear {
        #[command(flatten)]
        command: ClearCommand,
    },
    #[command(about = "Replace the history of the years found in a file exported earlier")]
    Import {
        #[command(flatten)]
        command: ImportCommand,
    },
    #[command(about = "Show the configuration file location and the effective configuration")]
    Config {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let logging_level = args.log.then_some(LevelFilter::TRACE);
    enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => {
            restart_daemon(&dir)?;
            println!("Started daemon in {dir:?}");
            Ok(())
        }
        Commands::Serve {} => start_daemon(&dir).await,
        Commands::Stop {} => {
            let stopped = stop_daemons(&daemon_executable()?)?;
            println!("Stopped {stopped} daemon(s)");
            Ok(())
        }
        Commands::Toggle {} => send_signal(Signal::User1),
        Commands::Save {} => send_signal(Signal::User2),
        Commands::Status { json } => process_status_command(&dir, json).await,
        Commands::Log { command } => process_log_command(&dir, command).await,
        Commands::Export { command } => process_export_command(&dir, command).await,
        Commands::Clear { command } => process_clear_command(&dir, command).await,
        Commands::Import { command } => process_import_command(&dir, command).await,
        Commands::Config {} => {
            let source = ConfigSource::in_dir(&dir);
            println!("# {}", source.path().display());
            println!("{}", serde_json::to_string_pretty(&source.load()?)?);
            Ok(())
        }
    }
}

fn send_signal(signal: Signal) -> Result<()> {
    if signal_daemons(&daemon_executable()?, signal)?.is_empty() {
        bail!("Daemon is not running, start it with `worktally init`");
    }
    Ok(())
}
