use anyhow::Result;
use clap::Parser;
use stsfs_cli::{cli::StsfsCli, run, telemetry};

#[tokio::main]
pub async fn main() -> Result<()> {
    telemetry::init()?;
    run(StsfsCli::parse()).await
}
