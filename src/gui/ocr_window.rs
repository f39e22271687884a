use std::path::Path;

use anyhow::Result;
use eframe::egui::{self, vec2, Color32, CornerRadius, RichText, Stroke, TextureHandle};
use egui_extras::Size;
use image::RgbaImage;

use crate::{
    capture::{CaptureController, CapturedImage},
    config::AppConfig,
    gui::popups::Popups,
    services::{
        ocr::{OcrError, OcrServiceJob},
        vocabulary::fallback_tokens,
        ServiceJob, Services,
    },
    session::{ImageTicket, LookupTicket, LookupView, Session},
    word::{LookupResult, VocabToken},
};

mod word_widget;
use word_widget::WordWidget;

/// The main window: camera preview or captured photo, the recognised words and the dictionary
/// panel for the selected word.
pub struct OcrWindow {
    pub capture: CaptureController,
    pub session: Session,

    ocr_jobs: Vec<(ImageTicket, OcrServiceJob)>,
    parse_jobs: Vec<(ImageTicket, ServiceJob<Vec<VocabToken>>)>,
    lookup_jobs: Vec<(LookupTicket, ServiceJob<Option<LookupResult>>)>,
    add_to_deck_jobs: Vec<(String, ServiceJob<Result<()>>)>,

    preview_texture: Option<TextureHandle>,
    photo_texture: Option<TextureHandle>,

    path_input: String,
}

impl OcrWindow {
    pub fn new(capture: CaptureController) -> Self {
        Self {
            capture,
            session: Session::default(),

            ocr_jobs: Vec::new(),
            parse_jobs: Vec::new(),
            lookup_jobs: Vec::new(),
            add_to_deck_jobs: Vec::new(),

            preview_texture: None,
            photo_texture: None,

            path_input: String::new(),
        }
    }

    pub fn has_pending_jobs(&self) -> bool {
        !(self.ocr_jobs.is_empty()
            && self.parse_jobs.is_empty()
            && self.lookup_jobs.is_empty()
            && self.add_to_deck_jobs.is_empty())
    }

    /// Show a new photo and start reading it.
    pub fn set_image(&mut self, image: CapturedImage, config: &AppConfig, services: &mut Services) {
        self.session.set_image(image);
        self.photo_texture = None;

        let Some(ticket) = self.session.begin_ocr() else {
            return;
        };
        let Some(image) = self.session.image() else {
            return;
        };

        log::info!(
            "Reading {}x{} image ({} bytes) with `{}`",
            image.image.width(),
            image.image.height(),
            image.encoded.len(),
            services.ocr.name()
        );
        let job = services
            .ocr
            .recognize(image.image.clone(), &config.ocr_language);
        self.ocr_jobs.push((ticket, job));
    }

    pub fn open_path(&mut self, path: &Path, config: &AppConfig, services: &mut Services) {
        if let Some(image) = self.capture.load_from_path(path) {
            self.set_image(image, config, services);
        }
    }

    /// Drop the current photo and go back to the camera.
    pub fn retake(&mut self) {
        self.session.retake();
        self.photo_texture = None;
        self.capture.start();
    }

    /// Parse the OCR text with the vocabulary service, ie. after an API key was configured.
    pub fn refresh_vocabulary(&mut self, services: &mut Services) {
        if let Some((ticket, text)) = self
            .session
            .begin_parse(services.vocabulary.has_api_key())
        {
            self.parse_jobs
                .push((ticket, services.vocabulary.parse_text(text)));
        }
    }

    pub fn select_word(&mut self, word: &str, services: &mut Services) {
        let has_api_key = services.vocabulary.has_api_key();
        if let Some(ticket) = self.session.select_word(word, has_api_key) {
            let job = services.vocabulary.lookup_word(ticket.word().to_owned());
            self.lookup_jobs.push((ticket, job));
        }
    }

    /// Apply the results of every finished background job.
    pub fn poll_jobs(&mut self, services: &mut Services, popups: &mut Popups) {
        for (ticket, result) in take_finished(&mut self.ocr_jobs) {
            let result = result.unwrap_or_else(|e| Err(OcrError::Engine(e.to_string())));
            if self.session.complete_ocr(ticket, result) {
                self.refresh_vocabulary(services);
            }
        }

        for (ticket, result) in take_finished(&mut self.parse_jobs) {
            let tokens = result.unwrap_or_else(|e| {
                log::error!("Vocabulary parse job failed: {e}");
                fallback_tokens(&self.session.ocr_text)
            });
            self.session.complete_parse(ticket, tokens);
        }

        for (ticket, result) in take_finished(&mut self.lookup_jobs) {
            let info = result.unwrap_or_else(|e| {
                log::error!("Lookup job for `{}` failed: {e}", ticket.word());
                None
            });
            self.session.complete_lookup(ticket, info);
        }

        for (spelling, result) in take_finished(&mut self.add_to_deck_jobs) {
            match result.and_then(|added| added) {
                Ok(()) => {
                    log::info!("Added `{spelling}` to deck");
                    self.session.mark_added_to_deck(&spelling);
                }
                Err(e) => popups.error(e),
            }
        }
    }

    fn handle_dropped_files(
        &mut self,
        ctx: &egui::Context,
        config: &AppConfig,
        services: &mut Services,
    ) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());

        // only the last file is kept if several are dropped at once
        let Some(file) = dropped.last() else {
            return;
        };

        let image = match (&file.bytes, &file.path) {
            (Some(bytes), _) => self.capture.load_from_file(bytes),
            (None, Some(path)) => self.capture.load_from_path(path),
            (None, None) => None,
        };
        if let Some(image) = image {
            self.set_image(image, config, services);
        }
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        config: &AppConfig,
        services: &mut Services,
        popups: &mut Popups,
        show_config: &mut bool,
    ) {
        self.poll_jobs(services, popups);
        self.handle_dropped_files(ctx, config, services);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar_ui(ui, config, services, show_config);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.session.image().is_some() {
                self.photo_ui(ui, config, services);
            } else {
                self.camera_ui(ui);
            }
        });

        self.dictionary_ui(ctx, config, services);

        if self.capture.is_streaming() || self.has_pending_jobs() {
            ctx.request_repaint();
        }
    }

    fn toolbar_ui(
        &mut self,
        ui: &mut egui::Ui,
        config: &AppConfig,
        services: &mut Services,
        show_config: &mut bool,
    ) {
        ui.horizontal(|ui| {
            if self.session.image().is_some() {
                if ui.button("Retake").clicked() {
                    self.retake();
                }
            } else if self.capture.is_streaming() {
                if ui.button("Take Photo").clicked() {
                    if let Some(image) = self.capture.capture() {
                        self.set_image(image, config, services);
                    }
                }
                if ui.button("Stop Camera").clicked() {
                    self.capture.stop();
                }
            } else if ui.button("Start Camera").clicked() {
                self.capture.start();
            }

            ui.separator();

            let path_edit = ui.add(
                egui::TextEdit::singleline(&mut self.path_input)
                    .hint_text("Path to an image")
                    .desired_width(240.0),
            );
            let submitted =
                path_edit.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter));
            if (ui.button("Open").clicked() || submitted) && !self.path_input.trim().is_empty() {
                let path = self.path_input.trim().to_owned();
                self.open_path(Path::new(&path), config, services);
            }

            if let Some(error) = self.capture.error() {
                ui.colored_label(ui.visuals().warn_fg_color, error);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Settings").clicked() {
                    *show_config = true;
                }
                if !services.vocabulary.has_api_key() {
                    ui.label(RichText::new("No jpdb API key, lookups are disabled").weak());
                }
            });
        });
    }

    fn camera_ui(&mut self, ui: &mut egui::Ui) {
        if let Some(frame) = self.capture.poll_frame().map(colour_image) {
            match &mut self.preview_texture {
                Some(texture) => texture.set(frame, egui::TextureOptions::LINEAR),
                None => {
                    self.preview_texture = Some(ui.ctx().load_texture(
                        "camera preview",
                        frame,
                        egui::TextureOptions::LINEAR,
                    ))
                }
            }
        } else {
            self.preview_texture = None;
        }

        match &self.preview_texture {
            Some(texture) => {
                ui.centered_and_justified(|ui| {
                    ui.add(egui::Image::from_texture(texture).max_size(ui.available_size()));
                });
            }
            None if self.capture.is_streaming() => {
                ui.centered_and_justified(|ui| {
                    ui.add(
                        egui::Spinner::new()
                            .color(Color32::from_white_alpha(96))
                            .size(48.0),
                    );
                });
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label(
                        RichText::new("Start the camera, or open or drop an image to read it.")
                            .size(20.0)
                            .weak(),
                    );
                });
            }
        }
    }

    fn photo_ui(&mut self, ui: &mut egui::Ui, config: &AppConfig, services: &mut Services) {
        if self.photo_texture.is_none() {
            if let Some(image) = self.session.image() {
                self.photo_texture = Some(ui.ctx().load_texture(
                    "captured photo",
                    colour_image(&image.image),
                    egui::TextureOptions::LINEAR,
                ));
            }
        }

        let padding = 16.0;
        let mut clicked_word = None;

        egui_extras::StripBuilder::new(ui)
            .size(Size::relative(0.55))
            .size(Size::exact(padding))
            .size(Size::remainder())
            .horizontal(|mut strip| {
                strip.cell(|ui| {
                    if let Some(word) = image_panel_ui(self, ui, config) {
                        clicked_word = Some(word);
                    }
                });

                strip.empty();

                strip.cell(|ui| {
                    if let Some(word) = text_panel_ui(self, ui, config) {
                        clicked_word = Some(word);
                    }
                });
            });

        if let Some(word) = clicked_word {
            self.select_word(&word, services);
        }

        fn image_panel_ui(win: &OcrWindow, ui: &mut egui::Ui, config: &AppConfig) -> Option<String> {
            let texture = win.photo_texture.as_ref()?;
            let displayed = ui
                .add(egui::Image::from_texture(texture).max_size(ui.available_size()))
                .rect;

            if !config.overlay_words || !win.session.has_word_boxes() {
                return None;
            }

            let mut clicked = None;
            for (idx, word) in win.session.overlay_words(displayed).into_iter().enumerate() {
                let response = ui.interact(
                    word.rect,
                    ui.id().with(("overlay_word", idx)),
                    egui::Sense::click(),
                );

                let [r, g, b] = config.card_colour(word.card_state);
                let colour = Color32::from_rgb(r, g, b);
                let selected = win.session.show_dictionary && win.session.selected_word == word.text;

                if selected || response.hovered() {
                    ui.painter().rect_filled(
                        word.rect,
                        CornerRadius::same(2),
                        colour.gamma_multiply(0.25),
                    );
                }
                ui.painter().rect_stroke(
                    word.rect,
                    CornerRadius::same(2),
                    Stroke::new(if selected { 2.0 } else { 1.0 }, colour),
                    egui::StrokeKind::Outside,
                );

                let hover_text = match word.confidence {
                    Some(confidence) => format!("{} ({confidence:.0}%)", word.text),
                    None => word.text.clone(),
                };
                if response
                    .on_hover_cursor(egui::CursorIcon::PointingHand)
                    .on_hover_text(hover_text)
                    .clicked()
                {
                    clicked = Some(word.text);
                }
            }
            clicked
        }

        fn text_panel_ui(win: &OcrWindow, ui: &mut egui::Ui, config: &AppConfig) -> Option<String> {
            let session = &win.session;

            if session.is_processing {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Reading text...");
                });
                return None;
            }

            if let Some(message) = &session.message {
                ui.label(RichText::new(message).size(18.0));
            }
            if session.is_parsing {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Looking up vocabulary...");
                });
            }

            let text_size = 28.0;
            let ruby_size = if config.show_readings { 11.0 } else { 0.0 };
            let mut clicked = None;

            egui::ScrollArea::vertical()
                .auto_shrink(false)
                .show(ui, |ui| {
                    ui.spacing_mut().item_spacing = vec2(0.0, text_size / 4.0);

                    ui.horizontal_wrapped(|ui| {
                        for word in session.display_words() {
                            let ruby = config
                                .show_readings
                                .then(|| session.token_for(&word))
                                .flatten()
                                .and_then(|token| token.reading.as_deref());
                            let [r, g, b] = config.card_colour(session.card_state_of(&word));
                            let selected =
                                session.show_dictionary && session.selected_word == word;

                            let response = ui.add(
                                WordWidget::new(&word)
                                    .ruby(ruby)
                                    .text_size(text_size)
                                    .ruby_size(ruby_size)
                                    .colour(Color32::from_rgb(r, g, b))
                                    .selected(selected),
                            );
                            if response.clicked() {
                                clicked = Some(word.clone());
                            }
                        }
                    });

                    if !session.ocr_text.trim().is_empty() {
                        ui.add_space(text_size);
                        ui.collapsing("Recognised Text", |ui| {
                            ui.label(&session.ocr_text);
                        });
                    }
                });

            clicked
        }
    }

    fn dictionary_ui(&mut self, ctx: &egui::Context, config: &AppConfig, services: &mut Services) {
        if !self.session.show_dictionary {
            return;
        }

        let backdrop_clicked = egui::Area::new(egui::Id::new("dictionary_backdrop"))
            .order(egui::Order::Middle)
            .fixed_pos(egui::Pos2::ZERO)
            .show(ctx, |ui| {
                let screen = ctx.screen_rect();
                let response = ui.allocate_rect(screen, egui::Sense::click());
                ui.painter()
                    .rect_filled(screen, CornerRadius::ZERO, Color32::from_black_alpha(128));
                response.clicked()
            })
            .inner;

        let has_api_key = services.vocabulary.has_api_key();
        let mut open = true;
        let mut close_clicked = false;
        let mut add_to_deck = None;

        egui::Window::new("Dictionary")
            .id(egui::Id::new("dictionary_panel"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_CENTER, vec2(0.0, 0.0))
            .collapsible(false)
            .resizable(false)
            .default_width(420.0)
            .open(&mut open)
            .show(ctx, |ui| {
                let text_size = 20.0;

                ui.label(
                    RichText::new(&self.session.selected_word)
                        .size(48.0)
                        .color(Color32::WHITE),
                );
                ui.separator();

                match self.session.lookup_view(has_api_key) {
                    LookupView::Disabled => {
                        ui.label("Add a jpdb API key in the settings to look up words.");
                    }
                    LookupView::Loading => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Looking up...");
                        });
                    }
                    LookupView::Empty => {
                        ui.label("No dictionary entry was found for this word.");
                    }
                    LookupView::Resolved(info) => {
                        let [r, g, b] = config.card_colour(info.card_state);
                        let state = info
                            .card_state
                            .map(|state| state.name())
                            .unwrap_or("not in deck");

                        ui.columns_const(|[col1, col2]| {
                            col1.label(
                                RichText::new(state)
                                    .size(text_size)
                                    .color(Color32::from_rgb(r, g, b)),
                            );

                            let freq = info
                                .frequency
                                .map(|n| format!("Top {n}"))
                                .unwrap_or_else(|| "Unknown Frequency".to_owned());
                            col2.label(RichText::new(freq).size(text_size));
                        });

                        ui.label(RichText::new(&info.spelling).size(36.0));
                        ui.label(
                            RichText::new(&info.reading)
                                .size(text_size)
                                .color(Color32::from_white_alpha(192)),
                        );
                        if let Some(difficulty) = info.difficulty {
                            ui.label(format!("Difficulty {difficulty}/5"));
                        }

                        ui.separator();

                        egui::ScrollArea::vertical()
                            .max_height(240.0)
                            .show(ui, |ui| {
                                for meaning in &info.meanings {
                                    ui.label(RichText::new(format!("・{meaning}")).size(text_size));
                                }
                            });

                        if info.card_state.is_none() && info.jpdb_vid_sid.is_some() {
                            let pending = self
                                .add_to_deck_jobs
                                .iter()
                                .any(|(spelling, _)| *spelling == info.spelling);
                            if ui
                                .add_enabled(!pending, egui::Button::new("Add to Deck"))
                                .clicked()
                            {
                                add_to_deck = Some(info.clone());
                            }
                        }
                    }
                }

                ui.separator();
                ui.vertical_centered(|ui| {
                    if ui.button("Close").clicked() {
                        close_clicked = true;
                    }
                });
            });

        if let Some(info) = add_to_deck {
            let job = services.vocabulary.add_to_deck(&info);
            self.add_to_deck_jobs.push((info.spelling, job));
        }

        if backdrop_clicked || close_clicked || !open {
            self.session.close_dictionary();
        }
    }
}

/// Removes every finished job from `jobs`, returning its key and result in the original order.
fn take_finished<K, T>(jobs: &mut Vec<(K, ServiceJob<T>)>) -> Vec<(K, Result<T>)> {
    let mut finished = Vec::new();

    let mut idx = 0;
    while idx < jobs.len() {
        match jobs[idx].1.try_wait().transpose() {
            None => idx += 1,
            Some(result) => {
                let (key, _) = jobs.remove(idx);
                finished.push((key, result));
            }
        }
    }

    finished
}

fn colour_image(image: &RgbaImage) -> egui::ColorImage {
    egui::ColorImage::from_rgba_unmultiplied(
        [image.width() as usize, image.height() as usize],
        image.as_flat_samples().as_slice(),
    )
}
