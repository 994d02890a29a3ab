mod config;
mod logger;
mod transcode;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use reencode::config::ReencodeConfig;

use crate::config::Config;
use crate::transcode::Transcode;

#[derive(Parser)]
#[command(author, version, name = env!("CARGO_BIN_NAME"), about = "Re-encode video files with HandBrakeCLI and replace the originals")]
pub(crate) struct ReencodeArgs {
    /// Optional input directory
    #[arg(value_hint = clap::ValueHint::DirPath)]
    path: Option<PathBuf>,

    /// Path to the HandBrakeCLI executable
    #[arg(short = 'b', long, name = "HANDBRAKE", value_hint = clap::ValueHint::FilePath)]
    handbrake: Option<PathBuf>,

    /// Constant quality target (lower is better)
    #[arg(short = 'q', long, name = "QUALITY")]
    quality: Option<f32>,

    /// Override file extensions to convert
    #[arg(short = 't', long, num_args = 1, action = clap::ArgAction::Append, name = "EXTENSION")]
    extension: Vec<String>,

    /// Scan timeout in seconds
    #[arg(long, name = "SCAN_SECONDS")]
    scan_timeout: Option<u64>,

    /// Encode timeout in seconds
    #[arg(long, name = "ENCODE_SECONDS")]
    encode_timeout: Option<u64>,

    /// Overwrite existing output files
    #[arg(short = 'f', long)]
    force: bool,

    /// Move original files to trash instead of deleting them
    #[arg(short = 'x', long)]
    trash: bool,

    /// Print commands without running them
    #[arg(short = 'p', long)]
    print: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = ReencodeArgs::parse();
    if let Some(ref shell) = args.completion {
        reencode::generate_shell_completion(*shell, ReencodeArgs::command(), true, env!("CARGO_BIN_NAME"))?;
        Ok(ExitCode::SUCCESS)
    } else {
        let user_config = ReencodeConfig::get_user_config();
        let config = Config::try_from_args(args, user_config)?;
        Transcode::new(config)?.run()
    }
}
