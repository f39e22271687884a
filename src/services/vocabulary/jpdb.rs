use std::time::Duration;

use anyhow::{anyhow, Context};
use attohttpc::StatusCode;
use eframe::egui;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    config::Config,
    services::ServiceJob,
    word::{difficulty_from_frequency, split_words, CardState, LookupResult, VocabToken},
};

use super::{fallback_tokens, VocabularyError, VocabularyService};

const DEFAULT_BASE_URL: &str = "https://jpdb.io/api/v1";

const VOCABULARY_FIELDS: [&str; 8] = [
    "vid",
    "sid",
    "spelling",
    "reading",
    "frequency_rank",
    "part_of_speech",
    "meanings",
    "card_state",
];

/// jpdb.io as a vocabulary service.
#[derive(Default)]
pub struct JpdbVocabulary {
    pub config: JpdbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JpdbConfig {
    pub api_key: String,
    pub base_url: String,
    pub mining_deck_id: u64,
    pub timeout_secs: u64,
}

impl Default for JpdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            mining_deck_id: 0,
            timeout_secs: 10,
        }
    }
}

impl Config for JpdbConfig {
    fn path() -> &'static str {
        "vocabulary/jpdb.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Mining Deck ID:");
            ui.add(egui::DragValue::new(&mut self.mining_deck_id));
        });
        ui.collapsing("Advanced", |ui| {
            ui.horizontal(|ui| {
                ui.label("API URL:");
                ui.text_edit_singleline(&mut self.base_url);
            });
            ui.horizontal(|ui| {
                ui.label("Timeout (seconds):");
                ui.add(egui::DragValue::new(&mut self.timeout_secs).range(1..=120));
            });
        });
    }
}

impl JpdbConfig {
    fn client(&self) -> JpdbClient {
        let api_key = self.api_key.trim();
        JpdbClient {
            api_key: (!api_key.is_empty()).then(|| api_key.to_owned()),
            base_url: self.base_url.trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

impl VocabularyService for JpdbVocabulary {
    fn name(&self) -> &'static str {
        "jpdb"
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.config = JpdbConfig::load().context("Jpdb: Failed to load configuration file")?;
        Ok(())
    }

    fn terminate(&mut self) -> anyhow::Result<()> {
        self.config
            .save()
            .context("Jpdb: Failed to save configuration file")
    }

    fn show_config_ui(&mut self, ui: &mut egui::Ui) {
        self.config.show_ui(ui);
    }

    fn api_key(&self) -> Option<&str> {
        let key = self.config.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    fn set_api_key(&mut self, key: String) {
        self.config.api_key = key;
    }

    fn parse_text(&self, text: String) -> ServiceJob<Vec<VocabToken>> {
        let client = self.config.client();
        ServiceJob::new(move || client.parse_text(&text))
    }

    fn lookup_word(&self, word: String) -> ServiceJob<Option<LookupResult>> {
        let client = self.config.client();
        ServiceJob::new(move || client.lookup_word(&word))
    }

    fn add_to_deck(&self, word: &LookupResult) -> ServiceJob<anyhow::Result<()>> {
        let client = self.config.client();
        let deck_id = self.config.mining_deck_id;
        let spelling = word.spelling.clone();
        let ids = word.jpdb_vid_sid;

        ServiceJob::new(move || {
            let ids = ids.ok_or_else(|| anyhow!("`{spelling}` has no jpdb vocabulary id"))?;
            client
                .add_to_deck(deck_id, ids)
                .with_context(|| format!("Jpdb: Failed to add `{spelling}` to deck {deck_id}"))
        })
    }
}

/// Blocking access to the jpdb API, cheap to clone into a background job.
#[derive(Debug, Clone)]
struct JpdbClient {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

/// A vocabulary entry as returned for `VOCABULARY_FIELDS`.
#[derive(Debug, Clone)]
struct VocabularyEntry {
    vid: u64,
    sid: u64,
    spelling: String,
    reading: String,
    frequency: Option<u64>,
    part_of_speech: Vec<String>,
    meanings: Vec<String>,
    card_state: Option<CardState>,
}

/// A token as returned for the `vocabulary_index`, `position` and `length` token fields.
/// Positions and lengths count Unicode scalar values.
#[derive(Debug, Clone, Copy)]
struct Token {
    vocabulary_index: Option<usize>,
    position: usize,
    length: usize,
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|array| {
            array
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

impl VocabularyEntry {
    fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            vid: value.get(0)?.as_u64()?,
            sid: value.get(1)?.as_u64()?,
            spelling: value.get(2)?.as_str()?.to_owned(),
            reading: value.get(3)?.as_str()?.to_owned(),
            frequency: value.get(4)?.as_u64(),
            part_of_speech: strings(value.get(5)?),
            meanings: strings(value.get(6)?),
            // null when the word is not in any of the user's decks
            card_state: value
                .get(7)?
                .get(0)
                .and_then(Value::as_str)
                .and_then(CardState::from_jpdb),
        })
    }

    fn to_token(&self, text: String) -> VocabToken {
        VocabToken {
            text,
            reading: Some(self.reading.clone()),
            part_of_speech: (!self.part_of_speech.is_empty()).then(|| self.part_of_speech.clone()),
            meanings: Some(self.meanings.clone()),
            card_state: self.card_state,
            difficulty: difficulty_from_frequency(self.frequency),
        }
    }

    fn to_lookup_result(&self) -> LookupResult {
        LookupResult {
            spelling: self.spelling.clone(),
            reading: self.reading.clone(),
            meanings: self.meanings.clone(),
            frequency: self.frequency,
            difficulty: difficulty_from_frequency(self.frequency),
            card_state: self.card_state,
            jpdb_vid_sid: Some((self.vid, self.sid)),
        }
    }
}

impl Token {
    fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            vocabulary_index: value.get(0)?.as_u64().map(|i| i as usize),
            position: value.get(1)?.as_u64()? as usize,
            length: value.get(2)?.as_u64()? as usize,
        })
    }
}

struct ParseResponse {
    /// One list of tokens per text block sent.
    tokens: Vec<Vec<Token>>,
    vocabulary: Vec<VocabularyEntry>,
}

impl JpdbClient {
    fn api_key(&self) -> Result<&str, VocabularyError> {
        self.api_key.as_deref().ok_or(VocabularyError::NoApiKey)
    }

    fn post(&self, endpoint: &str, body: &Value) -> Result<Value, VocabularyError> {
        let api_key = self.api_key()?;
        let url = format!("{}/{endpoint}", self.base_url);

        let network_failure = |source| VocabularyError::NetworkFailure {
            url: url.clone(),
            source,
        };
        let remote_error = |message: String| VocabularyError::RemoteError {
            url: url.clone(),
            message,
        };

        let response = attohttpc::post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(body)
            .map_err(network_failure)?
            .send()
            .map_err(network_failure)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(VocabularyError::Unauthorized),
            status if !status.is_success() => {
                let body = response.text().unwrap_or_default();
                return Err(remote_error(format!("HTTP {status}: {}", body.trim())));
            }
            _ => {}
        }

        response
            .json()
            .map_err(|e| remote_error(format!("response is not valid JSON: {e}")))
    }

    fn parse(&self, blocks: &[&str]) -> Result<ParseResponse, VocabularyError> {
        let url = format!("{}/parse", self.base_url);
        let malformed = |what: &str| VocabularyError::RemoteError {
            url: url.clone(),
            message: format!("malformed `{what}` in response"),
        };

        let json = self.post(
            "parse",
            &json!({
                "text": blocks,
                // positions are sliced by `char` below
                "position_length_encoding": "utf32",
                "token_fields": ["vocabulary_index", "position", "length"],
                "vocabulary_fields": VOCABULARY_FIELDS,
            }),
        )?;

        let tokens = json
            .get("tokens")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks
                    .iter()
                    .map(|block| block.as_array()?.iter().map(Token::from_json).collect())
                    .collect::<Option<Vec<Vec<Token>>>>()
            })
            .ok_or_else(|| malformed("tokens"))?;

        let vocabulary: Vec<VocabularyEntry> = json
            .get("vocabulary")
            .and_then(Value::as_array)
            .and_then(|entries| entries.iter().map(VocabularyEntry::from_json).collect())
            .ok_or_else(|| malformed("vocabulary"))?;

        if tokens.len() != blocks.len() {
            return Err(malformed("tokens"));
        }

        Ok(ParseResponse { tokens, vocabulary })
    }

    fn try_parse_text(&self, text: &str) -> Result<Vec<VocabToken>, VocabularyError> {
        let blocks: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.parse(&blocks)?;
        let mut result = Vec::new();

        for (block, tokens) in blocks.iter().zip(&response.tokens) {
            let chars: Vec<char> = block.chars().collect();
            let slice = |from: usize, to: usize| -> String {
                chars[from.min(chars.len())..to.min(chars.len())]
                    .iter()
                    .collect()
            };
            let mut cursor = 0;

            for token in tokens {
                if token.position > cursor {
                    // unparsed text between two tokens (whitespace, punctuation, ...)
                    result.extend(
                        split_words(&slice(cursor, token.position))
                            .into_iter()
                            .map(|text| VocabToken {
                                text,
                                ..Default::default()
                            }),
                    );
                }

                let text = slice(token.position, token.position + token.length);
                let entry = token
                    .vocabulary_index
                    .and_then(|index| response.vocabulary.get(index));
                result.push(match entry {
                    Some(entry) => entry.to_token(text),
                    None => VocabToken {
                        text,
                        ..Default::default()
                    },
                });

                cursor = cursor.max(token.position + token.length);
            }

            if cursor < chars.len() {
                result.extend(
                    split_words(&slice(cursor, chars.len()))
                        .into_iter()
                        .map(|text| VocabToken {
                            text,
                            ..Default::default()
                        }),
                );
            }
        }

        result.retain(|token| !token.text.trim().is_empty());
        Ok(result)
    }

    fn parse_text(&self, text: &str) -> Vec<VocabToken> {
        match self.try_parse_text(text) {
            Ok(tokens) => tokens,
            Err(VocabularyError::NoApiKey) => {
                log::debug!("Jpdb: no API key, using fallback segmentation");
                fallback_tokens(text)
            }
            Err(e) => {
                log::warn!("Jpdb: parsing failed, using fallback segmentation: {e}");
                fallback_tokens(text)
            }
        }
    }

    fn try_lookup_word(&self, word: &str) -> Result<Option<LookupResult>, VocabularyError> {
        let word = word.trim();
        if word.is_empty() {
            return Ok(None);
        }

        let response = self.parse(&[word])?;

        Ok(response
            .tokens
            .iter()
            .flatten()
            .find_map(|token| token.vocabulary_index)
            .and_then(|index| response.vocabulary.get(index))
            .map(VocabularyEntry::to_lookup_result))
    }

    fn lookup_word(&self, word: &str) -> Option<LookupResult> {
        match self.try_lookup_word(word) {
            Ok(result) => result,
            Err(VocabularyError::NoApiKey) => None,
            Err(e) => {
                log::warn!("Jpdb: lookup of `{word}` failed: {e}");
                None
            }
        }
    }

    fn add_to_deck(&self, deck_id: u64, (vid, sid): (u64, u64)) -> Result<(), VocabularyError> {
        self.post(
            "deck/add-vocabulary",
            &json!({
                "id": deck_id,
                "vocabulary": [[vid, sid]],
                "occurences": [1],
                "replace_existing_occurences": true
            }),
        )?;
        log::info!("Jpdb: added vocabulary ({vid}, {sid}) to deck {deck_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread::JoinHandle,
    };

    use super::*;

    /// Serves a single HTTP response on localhost and hands back the raw request it received.
    fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();
            request.push_str(&String::from_utf8(request_body).unwrap());

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });

        (format!("http://{addr}"), handle)
    }

    /// An address nothing listens on.
    fn closed_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn client(api_key: Option<&str>, base_url: String) -> JpdbClient {
        JpdbClient {
            api_key: api_key.map(str::to_owned),
            base_url,
            timeout: Duration::from_secs(5),
        }
    }

    fn parse_response() -> String {
        json!({
            "tokens": [[[0, 0, 3], [1, 4, 2]]],
            "vocabulary": [
                [1, 10, "日本語", "にほんご", 300, ["n"], ["Japanese (language)"], ["known"]],
                [2, 20, "勉強", "べんきょう", 8000, ["vs", "n"], ["study"], null]
            ]
        })
        .to_string()
    }

    #[test]
    fn no_key_falls_back_without_network() {
        // any connection attempt to this URL would fail loudly in `try_parse_text`
        let client = client(None, closed_url());

        assert!(matches!(
            client.try_parse_text("hello world"),
            Err(VocabularyError::NoApiKey)
        ));

        let tokens = client.parse_text("hello world");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["hello", "world"]);
        assert!(tokens.iter().all(|t| t.card_state == Some(CardState::New)));

        assert_eq!(client.lookup_word("hello"), None);
    }

    #[test]
    fn network_failure_falls_back() {
        let client = client(Some("secret"), closed_url());

        assert!(matches!(
            client.try_parse_text("hello world"),
            Err(VocabularyError::NetworkFailure { .. })
        ));
        assert_eq!(client.parse_text("hello world"), fallback_tokens("hello world"));
        assert_eq!(client.lookup_word("hello"), None);
    }

    #[test]
    fn unauthorized_is_reported_and_falls_back() {
        let (url, server) = serve_once("401 Unauthorized", "{}".to_owned());
        let client = client(Some("wrong"), url);

        assert!(matches!(
            client.try_parse_text("日本語"),
            Err(VocabularyError::Unauthorized)
        ));
        server.join().unwrap();

        let (url, server) = serve_once("401 Unauthorized", "{}".to_owned());
        let client = JpdbClient { base_url: url, ..client };
        assert_eq!(client.parse_text("日本語"), fallback_tokens("日本語"));
        server.join().unwrap();
    }

    #[test]
    fn server_error_is_a_remote_error() {
        let (url, server) = serve_once("500 Internal Server Error", "oops".to_owned());
        let client = client(Some("secret"), url);

        assert!(matches!(
            client.try_parse_text("日本語"),
            Err(VocabularyError::RemoteError { .. })
        ));
        server.join().unwrap();
    }

    #[test]
    fn malformed_response_is_a_remote_error() {
        let (url, server) = serve_once("200 OK", r#"{"tokens": 3}"#.to_owned());
        let client = client(Some("secret"), url);

        assert!(matches!(
            client.try_parse_text("日本語"),
            Err(VocabularyError::RemoteError { .. })
        ));
        server.join().unwrap();
    }

    #[test]
    fn parse_maps_tokens_to_vocabulary() {
        let (url, server) = serve_once("200 OK", parse_response());
        let client = client(Some("secret"), url);

        let tokens = client.try_parse_text("日本語、勉強").unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /parse"));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains("日本語、勉強"));
        assert!(request.contains(r#""position_length_encoding":"utf32""#));

        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["日本語", "、", "勉強"]);

        assert_eq!(tokens[0].reading.as_deref(), Some("にほんご"));
        assert_eq!(tokens[0].card_state, Some(CardState::Known));
        assert_eq!(tokens[0].difficulty, Some(1));
        assert_eq!(tokens[0].part_of_speech, Some(vec!["n".to_owned()]));

        assert_eq!(
            tokens[1],
            VocabToken {
                text: "、".to_owned(),
                ..Default::default()
            }
        );

        assert_eq!(tokens[2].card_state, None);
        assert_eq!(tokens[2].meanings, Some(vec!["study".to_owned()]));
    }

    #[test]
    fn astral_characters_count_as_one_position() {
        // 𠮟 is outside the BMP: one `char`, two UTF-16 units
        let response = json!({
            "tokens": [[[0, 0, 2], [1, 3, 1]]],
            "vocabulary": [
                [3, 30, "𠮟る", "しかる", 9000, ["v5r"], ["to scold"], ["learning"]],
                [4, 40, "本", "ほん", 200, ["n"], ["book"], null]
            ]
        })
        .to_string();
        let (url, server) = serve_once("200 OK", response);
        let client = client(Some("secret"), url);

        let tokens = client.try_parse_text("𠮟る 本").unwrap();
        let request = server.join().unwrap();

        assert!(request.contains(r#""position_length_encoding":"utf32""#));
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["𠮟る", "本"]);
        assert_eq!(tokens[0].card_state, Some(CardState::Learning));
        assert_eq!(tokens[1].reading.as_deref(), Some("ほん"));
    }

    #[test]
    fn lookup_returns_first_entry() {
        let response = json!({
            "tokens": [[[0, 0, 2]]],
            "vocabulary": [
                [3, 30, "勉強", "べんきょう", 800, ["vs"], ["study", "diligence"], ["due"]]
            ]
        });
        let (url, server) = serve_once("200 OK", response.to_string());
        let client = client(Some("secret"), url);

        let result = client.lookup_word(" 勉強 ").unwrap();
        server.join().unwrap();

        assert_eq!(result.spelling, "勉強");
        assert_eq!(result.reading, "べんきょう");
        assert_eq!(result.meanings, ["study", "diligence"]);
        assert_eq!(result.frequency, Some(800));
        assert_eq!(result.card_state, Some(CardState::Learning));
        assert_eq!(result.jpdb_vid_sid, Some((3, 30)));
    }

    #[test]
    fn lookup_without_entry_is_none() {
        let response = json!({ "tokens": [[]], "vocabulary": [] });
        let (url, server) = serve_once("200 OK", response.to_string());
        let client = client(Some("secret"), url);

        assert_eq!(client.lookup_word("ですわ"), None);
        server.join().unwrap();
    }

    #[test]
    fn add_to_deck_posts_ids() {
        let (url, server) = serve_once("200 OK", "{}".to_owned());
        let client = client(Some("secret"), url);

        client.add_to_deck(7, (3, 30)).unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /deck/add-vocabulary"));
        assert!(request.contains("[[3,30]]"));
    }

    #[test]
    fn blank_key_is_no_key() {
        let mut service = JpdbVocabulary::default();
        assert!(!service.has_api_key());

        service.set_api_key("   ".to_owned());
        assert_eq!(service.api_key(), None);

        service.set_api_key(" key ".to_owned());
        assert_eq!(service.api_key(), Some("key"));
        assert_eq!(service.config.client().api_key.as_deref(), Some("key"));
    }

    #[test]
    fn config_round_trip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = JpdbConfig {
            api_key: "abc".to_owned(),
            ..Default::default()
        };
        config.save_to(dir.path()).unwrap();

        let loaded = JpdbConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.api_key, "abc");
        assert_eq!(loaded.base_url, DEFAULT_BASE_URL);
        assert!(dir.path().join("vocabulary/jpdb.json").exists());
    }
}
