use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

/// Where credentials are kept between invocations unless told otherwise.
pub const DEFAULT_CREDENTIALS_FILE: &str = ".stsfs-credentials.json";

/// Per-request HTTP timeout unless told otherwise.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "stsfs")]
#[command(bin_name = "stsfs")]
#[command(about = "Storage operations with scoped, short-lived credentials", long_about = None)]
pub struct StsfsCli {
    /// JSON broker configuration; STSFS_* variables override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// User whose prefix the credentials are scoped to
    #[arg(short, long)]
    pub user: String,

    /// Bucket, optionally followed by a sub-path
    #[arg(short, long)]
    pub bucket: String,

    /// Where the current credentials are read from and written back to
    #[arg(long, default_value = DEFAULT_CREDENTIALS_FILE)]
    pub credentials_file: PathBuf,

    /// Role-assumption endpoint (defaults to the global STS endpoint)
    #[arg(long)]
    pub sts_endpoint: Option<Url>,

    /// S3-compatible endpoint, addressed path-style
    #[arg(long)]
    pub s3_endpoint: Option<Url>,

    /// Seconds any single HTTP request may take
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Write a file; content is read from stdin when not given
    Write { path: String, content: Option<String> },
    /// Print a file to stdout
    Read { path: String },
    /// List every key under a prefix, relative to it
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Remove a file
    Rm { path: String },
}
