pub mod logging;
pub mod pdf;
pub mod server;
pub mod settings;
pub mod translate;

pub use server::ServerState;
pub use settings::Settings;
pub use translate::TranslationClient;
