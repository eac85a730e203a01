// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod camera;
mod error;
mod frame;
mod mqtt;
mod pipeline;
mod poller;
mod publish;
mod settings;
mod temperature;
mod util;

use crate::pipeline::Pipeline;
use crate::settings::{Args, Settings};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Settings::from_path(&args.config_path)?;
    info!(config_path = %args.config_path.display(), "Loaded configuration");
    let app = Pipeline::new(config)
        .await
        .context("Unable to start the statistics pipeline")?;
    app.await
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::from_args();
    if let Err(err) = run(args).await {
        error!("{:?}", err);
        std::process::exit(1);
    }
}
