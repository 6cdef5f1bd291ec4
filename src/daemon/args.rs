use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Arguments of `worktally-daemon`. Normally it is spawned by `worktally init`.
#[derive(Parser, Debug)]
#[command(name = "worktally-daemon", version, about = "Background time tracker")]
pub struct DaemonArgs {
    /// Run in the current process instead of detaching.
    #[arg(long)]
    pub foreground: bool,
    /// Application directory holding records, configuration, status and logs.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Mirror logs to stdout. Only makes sense together with `--foreground`.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
