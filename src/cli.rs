use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (png, jpeg, gif, tiff, tga)\n",
    "HTTP:   reqwest 0.13 + tokio\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Animated image view driver (headless)
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging to file (default: flipbook.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a view configuration (JSON) and display it
    Play {
        /// View configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Stop after this many frame changes
        #[arg(short = 'n', long = "ticks", value_name = "N")]
        ticks: Option<usize>,

        /// Give up after this many seconds
        #[arg(short = 't', long = "timeout", value_name = "SECS", default_value = "10")]
        timeout: u64,

        /// Play frames back to front
        #[arg(short = 'r', long = "reverse")]
        reverse: bool,

        /// Write the last displayed image as PNG
        #[arg(short = 'o', long = "out", value_name = "PNG")]
        out: Option<PathBuf>,
    },

    /// Print how each configured image value resolves
    Resolve {
        /// View configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}
