use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "record-session")]
#[command(about = "Record the microphone into a WAV file")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub record: RecordArgs,
}

#[derive(Subcommand)]
pub enum Command {
    /// List input devices
    Devices,
}

#[derive(clap::Args)]
pub struct RecordArgs {
    /// JSON record config; absent fields keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Recordings directory (emptied on startup) [default: <documents>/Recordings]
    #[arg(short = 'o', long)]
    pub dir: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Enter
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Input device name [default: system default]
    #[arg(long)]
    pub device: Option<String>,

    /// Override the configured channel count
    #[arg(long)]
    pub channels: Option<u16>,

    /// Record a synthetic tone instead of the microphone
    #[arg(long)]
    pub tone: bool,

    /// Print the recognition query for the finished recording, using this API token
    #[arg(long, value_name = "TOKEN")]
    pub recognize_token: Option<String>,
}
