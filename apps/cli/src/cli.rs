use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stowage", version, about = "Sandboxed file storage with at-rest encryption")]
pub struct Cli {
    /// TOML configuration file; `STOWAGE__*` variables override it.
    #[arg(long, global = true, default_value = "stowage.toml", env = "STOWAGE_CONFIG")]
    pub config: PathBuf,
    /// Log at debug level (`-vv` for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Store a host file; prints the storage key.
    Put {
        source: PathBuf,
        /// Explicit key; a sharded unique key is generated when omitted.
        key: Option<String>,
    },
    /// Write a stored file's plaintext to OUTPUT, or stdout.
    Get { key: String, output: Option<PathBuf> },
    /// Show metadata of a stored file.
    Stat { key: String },
    /// List every stored file.
    Ls {
        #[arg(long)]
        per_page: Option<usize>,
    },
    /// Delete stored files.
    Rm {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    Cp { from: String, to: String },
    Mv { from: String, to: String },
    /// Print a fresh base64 key for `encryption.key`.
    Keygen,
}
