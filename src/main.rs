use clap::Parser;
use playlist_downloader::cli::Cli;
use playlist_downloader::utils::logger::Logger;
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        Logger::init_with_level(Level::DEBUG);
    } else {
        Logger::init();
    }

    let config = cli.load_config()?;
    cli.execute(config).await?;
    Ok(())
}
