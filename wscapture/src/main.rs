use anyhow::Context;
use clap::Parser;
use tracing::info;
use wscapture::cli::Args;
use wscapture::{logging, CaptureServer};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose)?;

    let config = args.session_config().context("invalid settings")?;
    info!("Size: {}x{}", config.width, config.height);
    info!("Encoding options: {}", config.encoder.options.join(" "));

    CaptureServer::new(config).start(&args.listen).await?;
    Ok(())
}
