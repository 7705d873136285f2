use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_TRANSLATION_URL: &str = "https://libretranslate.com/translate";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FONT_PATH: &str = "assets/NotoSansDevanagari-Regular.ttf";

/// Runtime configuration, resolved from CLI flags with environment fallbacks
/// (`LT_URL`, `PORT`, `TRANSLATOR_FONT`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub translation_url: String,
    pub listen_addr: String,
    pub font_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            translation_url: DEFAULT_TRANSLATION_URL.to_string(),
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
        }
    }
}

impl Settings {
    pub fn load(
        port: Option<u16>,
        translation_url: Option<String>,
        font_path: Option<PathBuf>,
    ) -> Result<Self> {
        let translation_url = translation_url
            .or_else(|| env_non_empty("LT_URL"))
            .unwrap_or_else(|| DEFAULT_TRANSLATION_URL.to_string());

        let port = match port {
            Some(port) => port,
            None => match env_non_empty("PORT") {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("invalid PORT value: {}", value))?,
                None => DEFAULT_PORT,
            },
        };

        let font_path = font_path
            .or_else(|| env_non_empty("TRANSLATOR_FONT").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_PATH));

        Ok(Self {
            translation_url,
            listen_addr: format!("0.0.0.0:{}", port),
            font_path,
        })
    }

    pub fn font_available(&self) -> bool {
        self.font_path.exists()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() { None } else { Some(value) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let settings = Settings::default();
        assert_eq!(settings.translation_url, DEFAULT_TRANSLATION_URL);
        assert_eq!(settings.listen_addr, "0.0.0.0:8080");
        assert_eq!(settings.font_path, PathBuf::from(DEFAULT_FONT_PATH));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let settings = Settings::load(
            Some(9000),
            Some("http://localhost:5000/translate".to_string()),
            Some(PathBuf::from("/tmp/font.ttf")),
        )
        .unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:9000");
        assert_eq!(settings.translation_url, "http://localhost:5000/translate");
        assert_eq!(settings.font_path, PathBuf::from("/tmp/font.ttf"));
    }
}
