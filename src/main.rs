use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use pdf_translate_server::{Settings, server};

#[derive(Parser, Debug)]
#[command(
    name = "pdf-translate-server",
    version,
    about = "Translate uploaded PDFs in place, preserving layout"
)]
struct Cli {
    /// Listening port (env: PORT)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Translation endpoint base URL (env: LT_URL)
    #[arg(short = 'u', long = "translation-url")]
    translation_url: Option<String>,

    /// Font file used for translated text (env: TRANSLATOR_FONT)
    #[arg(long = "font")]
    font: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pdf_translate_server::logging::init(cli.verbose)?;

    let settings = Settings::load(cli.port, cli.translation_url, cli.font)?;
    info!(
        addr = %settings.listen_addr,
        translation_api = %settings.translation_url,
        font = %settings.font_path.display(),
        font_available = settings.font_available(),
        "starting pdf translator server"
    );

    server::run_server(settings).await
}
