use std::str::FromStr;

use eframe::egui::{pos2, Rect};
use serde::{Deserialize, Serialize};

/// A word recognised by an OCR service.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// Location of the word in source image pixels.
    pub bbox: Option<BoundingBox>,
    /// Recognition confidence, from 0 to 100.
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    /// Map this box from source image space into a displayed image whose top left corner is
    /// `origin`, using independent horizontal and vertical scale factors.
    pub fn to_display_rect(&self, origin: eframe::egui::Pos2, scale: (f32, f32)) -> Rect {
        let (sx, sy) = scale;
        Rect::from_min_max(
            pos2(
                origin.x + self.x0 as f32 * sx,
                origin.y + self.y0 as f32 * sy,
            ),
            pos2(
                origin.x + self.x1 as f32 * sx,
                origin.y + self.y1 as f32 * sy,
            ),
        )
    }
}

/// A learning state as reported by the vocabulary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Known,
    Learning,
    New,
    Suspended,
    Locked,
}

impl CardState {
    pub const ALL: [CardState; 5] = [
        CardState::Known,
        CardState::Learning,
        CardState::New,
        CardState::Suspended,
        CardState::Locked,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Known => "known",
            Self::Learning => "learning",
            Self::New => "new",
            Self::Suspended => "suspended",
            Self::Locked => "locked",
        }
    }

    /// Maps the wider set of states jpdb reports onto the five states we display.
    pub fn from_jpdb(state: &str) -> Option<Self> {
        match state {
            "due" | "failed" => Some(Self::Learning),
            "never-forget" | "redundant" => Some(Self::Known),
            "blacklisted" => Some(Self::Suspended),
            other => other.parse().ok(),
        }
    }
}

impl FromStr for CardState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.name() == s)
            .ok_or(())
    }
}

/// Presentation tag for a card state. Unknown or missing states are shown as new words.
pub fn word_color_class(card_state: Option<CardState>) -> &'static str {
    match card_state.unwrap_or(CardState::New) {
        CardState::Known => "word-known",
        CardState::Learning => "word-learning",
        CardState::New => "word-new",
        CardState::Suspended => "word-suspended",
        CardState::Locked => "word-locked",
    }
}

/// A segment of parsed text, annotated by the vocabulary service when it could be matched to an
/// entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VocabToken {
    pub text: String,
    pub reading: Option<String>,
    pub part_of_speech: Option<Vec<String>>,
    pub meanings: Option<Vec<String>>,
    pub card_state: Option<CardState>,
    pub difficulty: Option<u8>,
}

impl VocabToken {
    /// A bare token produced without help from the vocabulary service.
    pub fn unparsed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            card_state: Some(CardState::New),
            ..Default::default()
        }
    }
}

/// Details about a single word, fetched when the user selects it.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub spelling: String,
    pub reading: String,
    pub meanings: Vec<String>,
    pub frequency: Option<u64>,
    pub difficulty: Option<u8>,
    pub card_state: Option<CardState>,

    pub jpdb_vid_sid: Option<(u64, u64)>,
}

/// Split text on runs of whitespace, dropping empty segments.
///
/// `char::is_whitespace` covers the ideographic space (U+3000) used between lines of Japanese
/// OCR output.
pub fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

/// Difficulty tier from 1 (very common) to 5 (rare) derived from a frequency rank.
pub fn difficulty_from_frequency(frequency_rank: Option<u64>) -> Option<u8> {
    frequency_rank.map(|rank| match rank {
        0..=1500 => 1,
        1501..=5000 => 2,
        5001..=15000 => 3,
        15001..=30000 => 4,
        _ => 5,
    })
}
