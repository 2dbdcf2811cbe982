use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "reelstate",
    version,
    about = "Browse a short-video feed and resume where you left off"
)]
pub struct Cli {
    /// Override the record store API base URL
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discovery feed, skipping episodes already watched
    Feed,
    /// Episode list of a single work, offering to resume
    Watch { work_id: String },
    /// List stored watch marks
    Marks,
    /// Show or set the mute preference
    Mute { state: Option<Toggle> },
    /// Forget which discovery items were watched
    ResetWatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}
