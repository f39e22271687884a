//! State of a single capture-and-read session, independent of any rendering.
//!
//! Background jobs are tagged when they are started ([`ImageTicket`], [`LookupTicket`]) and their
//! results are only applied if the tag still matches the session when they complete, so late
//! responses for a retaken photo or a previously selected word are dropped.

use eframe::egui::{Rect, Vec2};

use crate::{
    capture::CapturedImage,
    services::ocr::{OcrError, OcrOutput},
    word::{split_words, CardState, LookupResult, OcrWord, VocabToken},
};

/// Identifies the image a job was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTicket(u64);

/// Identifies a lookup and the word it was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    id: u64,
    word: String,
}

impl LookupTicket {
    pub fn word(&self) -> &str {
        &self.word
    }
}

/// What the dictionary panel shows for the selected word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupView<'a> {
    /// No API key is configured, lookups are not available.
    Disabled,
    Loading,
    Resolved(&'a LookupResult),
    /// The lookup finished without finding anything.
    Empty,
}

/// A recognised word placed over the displayed image.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayWord {
    pub text: String,
    pub rect: Rect,
    pub card_state: Option<CardState>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Default)]
pub struct Session {
    image: Option<CapturedImage>,
    generation: u64,

    pub ocr_text: String,
    pub ocr_words: Vec<OcrWord>,
    pub vocab_tokens: Vec<VocabToken>,

    pub is_processing: bool,
    pub is_parsing: bool,
    pub is_looking_up: bool,
    pub show_dictionary: bool,

    pub selected_word: String,
    pub selected_word_info: Option<LookupResult>,
    lookup_id: u64,

    /// Message for the user about the last OCR run.
    pub message: Option<String>,
}

impl Session {
    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    /// Replace the current photo, dropping everything derived from the previous one.
    pub fn set_image(&mut self, image: CapturedImage) {
        self.retake();
        self.image = Some(image);
    }

    /// Forget the current photo and everything read from it.
    pub fn retake(&mut self) {
        self.generation += 1;
        self.image = None;

        self.ocr_text.clear();
        self.ocr_words.clear();
        self.vocab_tokens.clear();
        self.is_processing = false;
        self.is_parsing = false;
        self.message = None;

        self.close_dictionary();
    }

    fn ticket(&self) -> ImageTicket {
        ImageTicket(self.generation)
    }

    /// Start reading the current photo. Returns `None` if there is no photo.
    pub fn begin_ocr(&mut self) -> Option<ImageTicket> {
        self.image.as_ref()?;
        self.is_processing = true;
        self.message = None;
        Some(self.ticket())
    }

    /// Apply the result of an OCR job. Returns `false` if the result was for an older photo and
    /// got discarded.
    pub fn complete_ocr(
        &mut self,
        ticket: ImageTicket,
        result: Result<OcrOutput, OcrError>,
    ) -> bool {
        if ticket != self.ticket() {
            log::debug!("Discarding OCR result for a previous photo");
            return false;
        }

        self.is_processing = false;

        match result {
            Ok(output) => {
                self.ocr_text = output.text;
                self.ocr_words = output.words.unwrap_or_default();
                self.vocab_tokens.clear();
                if self.ocr_text.trim().is_empty() {
                    self.message = Some("No text was found in this photo.".to_owned());
                }
            }
            Err(e) => {
                log::error!("OCR failed: {e}");
                self.message =
                    Some("Could not read text from this photo. Please try again.".to_owned());
            }
        }

        true
    }

    /// Start parsing the OCR text with the vocabulary service. Only happens when there is text
    /// and an API key.
    pub fn begin_parse(&mut self, has_api_key: bool) -> Option<(ImageTicket, String)> {
        if !has_api_key || self.ocr_text.trim().is_empty() {
            return None;
        }
        self.is_parsing = true;
        Some((self.ticket(), self.ocr_text.clone()))
    }

    pub fn complete_parse(&mut self, ticket: ImageTicket, tokens: Vec<VocabToken>) -> bool {
        if ticket != self.ticket() {
            log::debug!("Discarding vocabulary tokens for a previous photo");
            return false;
        }
        self.is_parsing = false;
        self.vocab_tokens = tokens;
        true
    }

    /// Words to show as clickable text: the vocabulary tokens if there are any, otherwise the OCR
    /// text split on whitespace.
    pub fn display_words(&self) -> Vec<String> {
        if self.vocab_tokens.is_empty() {
            return split_words(&self.ocr_text);
        }

        self.vocab_tokens
            .iter()
            .map(|token| token.text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// The first vocabulary token whose trimmed text equals `word`.
    ///
    /// A word appearing several times with different states always resolves to its first
    /// occurrence.
    pub fn token_for(&self, word: &str) -> Option<&VocabToken> {
        let word = word.trim();
        self.vocab_tokens
            .iter()
            .find(|token| token.text.trim() == word)
    }

    pub fn card_state_of(&self, word: &str) -> Option<CardState> {
        self.token_for(word).and_then(|token| token.card_state)
    }

    pub fn has_word_boxes(&self) -> bool {
        self.ocr_words.iter().any(|word| word.bbox.is_some())
    }

    /// Select a word and open the dictionary panel. Returns a ticket when a lookup should be
    /// started, which is only the case with an API key.
    pub fn select_word(&mut self, word: &str, has_api_key: bool) -> Option<LookupTicket> {
        let word = word.trim();
        if word.is_empty() {
            return None;
        }

        self.lookup_id += 1;
        self.selected_word = word.to_owned();
        self.selected_word_info = None;
        self.show_dictionary = true;
        self.is_looking_up = has_api_key;

        has_api_key.then(|| LookupTicket {
            id: self.lookup_id,
            word: self.selected_word.clone(),
        })
    }

    /// Apply the result of a lookup, unless another word was selected in the meantime.
    pub fn complete_lookup(&mut self, ticket: LookupTicket, result: Option<LookupResult>) -> bool {
        if ticket.id != self.lookup_id || ticket.word != self.selected_word {
            log::debug!("Discarding lookup result for `{}`", ticket.word);
            return false;
        }
        self.is_looking_up = false;
        self.selected_word_info = result;
        true
    }

    pub fn close_dictionary(&mut self) {
        self.lookup_id += 1;
        self.selected_word.clear();
        self.selected_word_info = None;
        self.is_looking_up = false;
        self.show_dictionary = false;
    }

    /// Record that a word was added to the user's deck.
    pub fn mark_added_to_deck(&mut self, spelling: &str) {
        if let Some(info) = &mut self.selected_word_info {
            if info.spelling == spelling {
                info.card_state = Some(CardState::New);
            }
        }
        for token in &mut self.vocab_tokens {
            if token.text.trim() == spelling && token.card_state.is_none() {
                token.card_state = Some(CardState::New);
            }
        }
    }

    pub fn lookup_view(&self, has_api_key: bool) -> LookupView<'_> {
        lookup_view(
            self.is_looking_up,
            self.selected_word_info.as_ref(),
            has_api_key,
        )
    }

    /// Recognised words with a bounding box, placed over the image drawn at `displayed`.
    pub fn overlay_words(&self, displayed: Rect) -> Vec<OverlayWord> {
        let Some(image) = &self.image else {
            return Vec::new();
        };
        let Some(scale) = display_scale(image.natural_size(), displayed.size()) else {
            return Vec::new();
        };

        self.ocr_words
            .iter()
            .filter(|word| !word.text.trim().is_empty())
            .filter_map(|word| {
                let bbox = word.bbox?;
                Some(OverlayWord {
                    text: word.text.trim().to_owned(),
                    rect: bbox.to_display_rect(displayed.min, scale),
                    card_state: self.card_state_of(&word.text),
                    confidence: word.confidence,
                })
            })
            .collect()
    }
}

pub fn lookup_view(
    is_looking_up: bool,
    selected_word_info: Option<&LookupResult>,
    has_api_key: bool,
) -> LookupView<'_> {
    match (has_api_key, is_looking_up, selected_word_info) {
        (false, _, _) => LookupView::Disabled,
        (true, true, _) => LookupView::Loading,
        (true, false, Some(info)) => LookupView::Resolved(info),
        (true, false, None) => LookupView::Empty,
    }
}

/// Horizontal and vertical factors mapping natural image pixels to displayed points. `None` while
/// either size is still zero.
pub fn display_scale(natural: (u32, u32), displayed: Vec2) -> Option<(f32, f32)> {
    let (width, height) = natural;
    if width == 0 || height == 0 || displayed.x <= 0.0 || displayed.y <= 0.0 {
        return None;
    }
    Some((displayed.x / width as f32, displayed.y / height as f32))
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};
    use image::RgbaImage;

    use crate::word::BoundingBox;

    use super::*;

    fn image(width: u32, height: u32) -> CapturedImage {
        CapturedImage::from_frame(RgbaImage::new(width, height)).unwrap()
    }

    fn text_output(text: &str) -> OcrOutput {
        OcrOutput {
            text: text.to_owned(),
            words: None,
        }
    }

    fn lookup_result(spelling: &str) -> LookupResult {
        LookupResult {
            spelling: spelling.to_owned(),
            reading: "よみ".to_owned(),
            meanings: vec!["meaning".to_owned()],
            frequency: Some(100),
            difficulty: Some(1),
            card_state: None,
            jpdb_vid_sid: Some((1, 2)),
        }
    }

    fn word(text: &str, x0: u32, y0: u32, x1: u32, y1: u32) -> OcrWord {
        OcrWord {
            text: text.to_owned(),
            bbox: Some(BoundingBox { x0, y0, x1, y1 }),
            confidence: Some(90.0),
        }
    }

    /// A session with a photo already read as `text`.
    fn read_session(text: &str) -> Session {
        let mut session = Session::default();
        session.set_image(image(10, 10));
        let ticket = session.begin_ocr().unwrap();
        assert!(session.complete_ocr(ticket, Ok(text_output(text))));
        session
    }

    #[test]
    fn ocr_needs_a_photo() {
        let mut session = Session::default();
        assert!(session.begin_ocr().is_none());
        assert!(!session.is_processing);
    }

    #[test]
    fn unconfigured_scenario_disables_lookup() {
        let mut session = read_session("こんにちは 世界");

        assert!(session.begin_parse(false).is_none());
        assert_eq!(session.display_words(), ["こんにちは", "世界"]);

        assert!(session.select_word("こんにちは", false).is_none());
        assert_eq!(session.selected_word, "こんにちは");
        assert!(session.show_dictionary);
        assert_eq!(session.lookup_view(false), LookupView::Disabled);
    }

    #[test]
    fn parse_only_with_text_and_key() {
        let mut session = read_session("   ");
        assert!(session.begin_parse(true).is_none());
        assert!(session.message.is_some());

        let mut session = read_session("日本語");
        let (_, text) = session.begin_parse(true).unwrap();
        assert_eq!(text, "日本語");
        assert!(session.is_parsing);
    }

    #[test]
    fn tokens_replace_naive_split() {
        let mut session = read_session("日本語を勉強");
        let (ticket, _) = session.begin_parse(true).unwrap();

        let tokens = vec![
            VocabToken {
                text: "日本語".to_owned(),
                card_state: Some(CardState::Known),
                ..Default::default()
            },
            VocabToken {
                text: " ".to_owned(),
                ..Default::default()
            },
            VocabToken::unparsed("を"),
            VocabToken::unparsed("勉強"),
        ];
        assert!(session.complete_parse(ticket, tokens));

        assert!(!session.is_parsing);
        assert_eq!(session.display_words(), ["日本語", "を", "勉強"]);
        assert_eq!(session.card_state_of(" 日本語 "), Some(CardState::Known));
    }

    #[test]
    fn repeated_word_resolves_to_first_token() {
        let mut session = read_session("行く 行く");
        let (ticket, _) = session.begin_parse(true).unwrap();
        session.complete_parse(
            ticket,
            vec![
                VocabToken {
                    text: "行く".to_owned(),
                    card_state: Some(CardState::Learning),
                    ..Default::default()
                },
                VocabToken {
                    text: "行く".to_owned(),
                    card_state: Some(CardState::Known),
                    ..Default::default()
                },
            ],
        );

        assert_eq!(session.card_state_of("行く"), Some(CardState::Learning));
    }

    #[test]
    fn ocr_failure_sets_message() {
        let mut session = Session::default();
        session.set_image(image(4, 4));
        let ticket = session.begin_ocr().unwrap();

        assert!(session.complete_ocr(ticket, Err(OcrError::Engine("crashed".to_owned()))));
        assert!(!session.is_processing);
        assert!(session.message.as_deref().unwrap().contains("try again"));
        assert!(session.display_words().is_empty());
    }

    #[test]
    fn lookup_states() {
        let mut session = read_session("勉強");

        let ticket = session.select_word(" 勉強 ", true).unwrap();
        assert_eq!(ticket.word(), "勉強");
        assert_eq!(session.lookup_view(true), LookupView::Loading);

        let result = lookup_result("勉強");
        assert!(session.complete_lookup(ticket, Some(result.clone())));
        assert_eq!(session.lookup_view(true), LookupView::Resolved(&result));

        let ticket = session.select_word("勉強", true).unwrap();
        assert!(session.complete_lookup(ticket, None));
        assert_eq!(session.lookup_view(true), LookupView::Empty);
    }

    #[test]
    fn render_state_is_derived_from_flags() {
        let info = lookup_result("語");

        assert_eq!(lookup_view(true, Some(&info), false), LookupView::Disabled);
        assert_eq!(lookup_view(false, None, false), LookupView::Disabled);
        assert_eq!(lookup_view(true, Some(&info), true), LookupView::Loading);
        assert_eq!(lookup_view(false, Some(&info), true), LookupView::Resolved(&info));
        assert_eq!(lookup_view(false, None, true), LookupView::Empty);
    }

    #[test]
    fn stale_lookup_does_not_clobber_newer_selection() {
        let mut session = read_session("一 二");

        let first = session.select_word("一", true).unwrap();
        let second = session.select_word("二", true).unwrap();

        assert!(!session.complete_lookup(first, Some(lookup_result("一"))));
        assert_eq!(session.selected_word, "二");
        assert_eq!(session.selected_word_info, None);
        assert!(session.is_looking_up);

        assert!(session.complete_lookup(second, Some(lookup_result("二"))));
        assert_eq!(session.selected_word_info.unwrap().spelling, "二");
    }

    #[test]
    fn reselecting_same_word_ignores_older_lookup() {
        let mut session = read_session("一");

        let first = session.select_word("一", true).unwrap();
        let second = session.select_word("一", true).unwrap();

        assert!(!session.complete_lookup(first, None));
        assert!(session.is_looking_up);
        assert!(session.complete_lookup(second, Some(lookup_result("一"))));
    }

    #[test]
    fn close_always_resets_selection() {
        // loading
        let mut session = read_session("一");
        let loading = session.select_word("一", true).unwrap();
        session.close_dictionary();
        assert_eq!(session.selected_word, "");
        assert_eq!(session.selected_word_info, None);
        assert!(!session.show_dictionary);
        // a lookup resolving after close changes nothing
        assert!(!session.complete_lookup(loading, Some(lookup_result("一"))));
        assert_eq!(session.selected_word_info, None);

        // resolved
        let ticket = session.select_word("一", true).unwrap();
        session.complete_lookup(ticket, Some(lookup_result("一")));
        session.close_dictionary();
        assert_eq!(session.selected_word, "");
        assert_eq!(session.selected_word_info, None);

        // empty
        let ticket = session.select_word("一", true).unwrap();
        session.complete_lookup(ticket, None);
        session.close_dictionary();
        assert_eq!(session.selected_word, "");
        assert_eq!(session.selected_word_info, None);
        assert!(!session.is_looking_up);
    }

    #[test]
    fn blank_selection_is_ignored() {
        let mut session = read_session("一");
        assert!(session.select_word("  ", true).is_none());
        assert!(!session.show_dictionary);
    }

    #[test]
    fn retake_clears_everything_derived() {
        let mut session = Session::default();
        session.set_image(image(200, 100));
        let ocr = session.begin_ocr().unwrap();
        session.complete_ocr(
            ocr,
            Ok(OcrOutput {
                text: "一 二".to_owned(),
                words: Some(vec![word("一", 0, 0, 10, 10), word("二", 20, 0, 30, 10)]),
            }),
        );
        let (parse, _) = session.begin_parse(true).unwrap();
        session.complete_parse(parse, vec![VocabToken::unparsed("一")]);
        session.select_word("一", true);

        session.retake();

        assert!(session.image().is_none());
        assert!(session.ocr_text.is_empty());
        assert!(session.ocr_words.is_empty());
        assert!(session.vocab_tokens.is_empty());
        assert!(session.display_words().is_empty());
        assert!(session
            .overlay_words(Rect::from_min_size(pos2(0.0, 0.0), vec2(200.0, 100.0)))
            .is_empty());
        assert!(!session.show_dictionary);
        assert!(!session.is_processing && !session.is_parsing && !session.is_looking_up);
    }

    #[test]
    fn late_results_for_previous_photo_are_discarded() {
        let mut session = Session::default();
        session.set_image(image(10, 10));
        let old_ocr = session.begin_ocr().unwrap();

        session.set_image(image(10, 10));
        let new_ocr = session.begin_ocr().unwrap();

        assert!(!session.complete_ocr(old_ocr, Ok(text_output("古い"))));
        assert!(session.ocr_text.is_empty());
        assert!(session.is_processing);

        assert!(session.complete_ocr(new_ocr, Ok(text_output("新しい"))));
        let (parse, _) = session.begin_parse(true).unwrap();

        session.retake();
        assert!(!session.complete_parse(parse, vec![VocabToken::unparsed("新しい")]));
        assert!(session.vocab_tokens.is_empty());
    }

    #[test]
    fn overlays_follow_displayed_size() {
        let mut session = Session::default();
        session.set_image(image(400, 200));
        let ticket = session.begin_ocr().unwrap();
        session.complete_ocr(
            ticket,
            Ok(OcrOutput {
                text: "こんにちは 世界".to_owned(),
                words: Some(vec![
                    word("こんにちは", 0, 0, 100, 50),
                    word("世界", 110, 0, 180, 50),
                ]),
            }),
        );

        assert!(session.has_word_boxes());

        let displayed = Rect::from_min_size(pos2(0.0, 0.0), vec2(200.0, 100.0));
        let overlays = session.overlay_words(displayed);

        assert_eq!(overlays.len(), 2);
        assert_eq!(
            overlays[0].rect,
            Rect::from_min_max(pos2(0.0, 0.0), pos2(50.0, 25.0))
        );
        assert_eq!(
            overlays[1].rect,
            Rect::from_min_max(pos2(55.0, 0.0), pos2(90.0, 25.0))
        );
        assert_eq!(overlays[1].rect.width(), 35.0);
        assert_eq!(overlays[1].rect.height(), 25.0);
        assert_eq!(overlays[1].text, "世界");
    }

    #[test]
    fn overlays_are_offset_by_image_position() {
        let mut session = Session::default();
        session.set_image(image(100, 100));
        let ticket = session.begin_ocr().unwrap();
        session.complete_ocr(
            ticket,
            Ok(OcrOutput {
                text: "一".to_owned(),
                words: Some(vec![word("一", 10, 10, 20, 20)]),
            }),
        );

        let overlays =
            session.overlay_words(Rect::from_min_size(pos2(30.0, 40.0), vec2(100.0, 100.0)));
        assert_eq!(overlays[0].rect.min, pos2(40.0, 50.0));
    }

    #[test]
    fn scale_guards_unloaded_images() {
        assert_eq!(display_scale((0, 0), vec2(100.0, 100.0)), None);
        assert_eq!(display_scale((100, 0), vec2(100.0, 100.0)), None);
        assert_eq!(display_scale((100, 100), vec2(0.0, 0.0)), None);
        assert_eq!(
            display_scale((400, 200), vec2(200.0, 200.0)),
            Some((0.5, 1.0))
        );
    }

    #[test]
    fn adding_to_deck_marks_word_new() {
        let mut session = read_session("勉強");
        let (parse, _) = session.begin_parse(true).unwrap();
        session.complete_parse(
            parse,
            vec![VocabToken {
                text: "勉強".to_owned(),
                ..Default::default()
            }],
        );
        let ticket = session.select_word("勉強", true).unwrap();
        session.complete_lookup(ticket, Some(lookup_result("勉強")));

        session.mark_added_to_deck("勉強");

        assert_eq!(
            session.selected_word_info.as_ref().unwrap().card_state,
            Some(CardState::New)
        );
        assert_eq!(session.card_state_of("勉強"), Some(CardState::New));
    }
}
