//! Minichain node binary

use clap::Parser;

use minichain::config::{Args, Config};
use minichain::error::Result;
use minichain::{node, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(args)?;

    utils::init_logging(&config.logging.level, &config.logging.format);

    node::run(config).await
}
