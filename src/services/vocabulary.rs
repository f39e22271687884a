use anyhow::Result;
use eframe::egui;
use thiserror::Error;

use crate::word::{split_words, LookupResult, VocabToken};

use super::ServiceJob;

pub mod jpdb;

/// A remote vocabulary tracking service which segments text and reports how well the user knows
/// each word.
///
/// `parse_text` and `lookup_word` never fail: when the service is not configured or cannot be
/// reached they fall back to [`fallback_tokens`] and `None` respectively.
pub trait VocabularyService {
    fn name(&self) -> &'static str;

    /// Initialise the service (ie. load its configuration file, etc).
    fn init(&mut self) -> Result<()>;
    /// Terminate the service (ie. save its configuration file, etc).
    fn terminate(&mut self) -> Result<()>;

    fn show_config_ui(&mut self, ui: &mut egui::Ui);

    /// The configured API key, if any. Without one the service runs in degraded mode.
    fn api_key(&self) -> Option<&str>;
    fn set_api_key(&mut self, key: String);

    fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Segment text into annotated tokens.
    fn parse_text(&self, text: String) -> ServiceJob<Vec<VocabToken>>;
    /// Fetch details about a single word.
    fn lookup_word(&self, word: String) -> ServiceJob<Option<LookupResult>>;
    /// Add a looked up word to the user's mining deck.
    fn add_to_deck(&self, word: &LookupResult) -> ServiceJob<Result<()>>;
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("no API key is configured")]
    NoApiKey,
    #[error("the API key was rejected (HTTP 401)")]
    Unauthorized,
    #[error("`{url}` returned an error: {message}")]
    RemoteError { url: String, message: String },
    #[error("could not reach `{url}`")]
    NetworkFailure {
        url: String,
        #[source]
        source: attohttpc::Error,
    },
}

/// Tokens used when the remote service is unavailable: whitespace separated words, all new.
pub fn fallback_tokens(text: &str) -> Vec<VocabToken> {
    split_words(text)
        .into_iter()
        .map(VocabToken::unparsed)
        .collect()
}
