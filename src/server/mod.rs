mod handlers;
mod models;
mod pipeline;

pub use handlers::{router, run_server};

use anyhow::Result;

use crate::pdf::font::OverlayFont;
use crate::settings::Settings;
use crate::translate::TranslationClient;

/// Shared per-process state: configuration, the translation client, and the
/// overlay font loaded once at startup (a missing font file warns once here
/// and every request degrades to the built-in font).
#[derive(Clone)]
pub struct ServerState {
    pub settings: Settings,
    pub(crate) client: TranslationClient,
    pub(crate) font: OverlayFont,
}

impl ServerState {
    pub fn new(settings: Settings) -> Result<Self> {
        let client = TranslationClient::new(settings.translation_url.clone())?;
        let font = OverlayFont::load(&settings.font_path);
        Ok(Self {
            settings,
            client,
            font,
        })
    }
}
