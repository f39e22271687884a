use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use eframe::egui;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    services::{
        camera::{self, Camera, FacingMode},
        ocr::{owocr::Owocr, tesseract::Tesseract, OcrService},
    },
    word::{word_color_class, CardState},
};

/// A configuration file stored in the user's configuration directory.
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Path of the configuration file, relative to the application's configuration directory.
    fn path() -> &'static str;
    fn show_ui(&mut self, ui: &mut egui::Ui);

    /// Loads a configuration file, or creates a default configuration struct if the file does not exist.
    fn load() -> Result<Self> {
        Self::load_from(&config_dir()?)
    }

    fn save(&self) -> Result<()> {
        self.save_to(&config_dir()?)
    }

    fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::path());

        if !config_path.exists() {
            log::debug!(
                "No configuration file at `{}`, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let file = File::open(&config_path).with_context(|| {
            format!(
                "Could not open configuration file: `{}`",
                config_path.display()
            )
        })?;

        serde_json::from_reader(file).with_context(|| {
            format!(
                "Could not read configuration file: `{}`",
                config_path.display(),
            )
        })
    }

    fn save_to(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join(Self::path());

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Could not create configuration directory: `{}`",
                    parent.display()
                )
            })?;
        }

        let file = File::create(&config_path).with_context(|| {
            format!(
                "Could not write to configuration file: `{}`",
                config_path.display()
            )
        })?;

        serde_json::to_writer_pretty(file, self).with_context(|| {
            format!(
                "Could not serialise configuration file: `{}`",
                config_path.display()
            )
        })?;

        log::debug!("Saved configuration to `{}`", config_path.display());

        Ok(())
    }
}

/// `<user config dir>/snapjisho`
pub fn config_dir() -> Result<PathBuf> {
    let mut path =
        dirs::config_dir().ok_or_else(|| anyhow!("Could not find suitable config directory"))?;
    path.push(env!("CARGO_PKG_NAME"));
    Ok(path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ocr_service: OcrServiceList,
    /// Language tag handed to the OCR service.
    pub ocr_language: String,

    pub camera_index: u32,
    pub facing_mode: FacingMode,

    /// Draw clickable boxes over the photo when the OCR service reports word positions.
    pub overlay_words: bool,
    pub show_readings: bool,

    pub window_width: u32,
    pub window_height: u32,

    /// Colours keyed by the tag returned from [`word_color_class`].
    pub card_colours: BTreeMap<String, [u8; 3]>,
}

impl AppConfig {
    pub fn card_colour(&self, card_state: Option<CardState>) -> [u8; 3] {
        self.card_colours
            .get(word_color_class(card_state))
            .copied()
            .unwrap_or([255, 255, 255])
    }
}

impl Config for AppConfig {
    fn path() -> &'static str {
        "config.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        egui::ComboBox::from_label("OCR Service")
            .selected_text(self.ocr_service.name())
            .show_ui(ui, |ui| {
                for service in OcrServiceList::ALL {
                    ui.selectable_value(&mut self.ocr_service, service, service.name());
                }
            });

        ui.horizontal(|ui| {
            ui.label("OCR Language:");
            ui.text_edit_singleline(&mut self.ocr_language);
        });

        ui.horizontal(|ui| {
            ui.label("Camera Index:");
            ui.add(egui::DragValue::new(&mut self.camera_index));
        });

        egui::ComboBox::from_label("Preferred Camera")
            .selected_text(format!("{:?}", self.facing_mode))
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut self.facing_mode, FacingMode::Environment, "Environment");
                ui.selectable_value(&mut self.facing_mode, FacingMode::User, "User");
            });

        ui.checkbox(&mut self.overlay_words, "Show words over the photo when possible");
        ui.checkbox(&mut self.show_readings, "Show readings above words");

        ui.collapsing("Card Colours", |ui| {
            for state in CardState::ALL {
                let colour = self
                    .card_colours
                    .entry(word_color_class(Some(state)).to_owned())
                    .or_insert([255, 255, 255]);
                ui.horizontal(|ui| {
                    egui::color_picker::color_edit_button_srgb(ui, colour);
                    ui.label(state.name());
                });
            }
        });
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let card_colours = [
            (CardState::Known, [125, 255, 125]),
            (CardState::Learning, [170, 240, 255]),
            (CardState::New, [0, 200, 255]),
            (CardState::Suspended, [192, 192, 192]),
            (CardState::Locked, [255, 75, 60]),
        ]
        .into_iter()
        .map(|(state, colour)| (word_color_class(Some(state)).to_owned(), colour))
        .collect();

        Self {
            ocr_service: OcrServiceList::Tesseract,
            ocr_language: "jpn".to_owned(),
            camera_index: 0,
            facing_mode: FacingMode::Environment,
            overlay_words: true,
            show_readings: true,
            window_width: 1280,
            window_height: 800,
            card_colours,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum OcrServiceList {
    Tesseract,
    Owocr,
}

impl OcrServiceList {
    pub const ALL: [OcrServiceList; 2] = [Self::Tesseract, Self::Owocr];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tesseract => "Tesseract",
            Self::Owocr => "owocr",
        }
    }

    pub fn create_service(&self) -> Box<dyn OcrService> {
        match self {
            Self::Tesseract => Box::new(Tesseract::default()),
            Self::Owocr => Box::new(Owocr::default()),
        }
    }
}

/// Creates the camera backend for the given configuration.
pub fn create_camera(config: &AppConfig) -> Box<dyn Camera> {
    camera::default_camera(config.camera_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = AppConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.ocr_language, "jpn");
        assert_eq!(config.ocr_service, OcrServiceList::Tesseract);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut config = AppConfig::default();
        config.ocr_service = OcrServiceList::Owocr;
        config.camera_index = 2;
        config.save_to(dir.path()).unwrap();

        let loaded = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.ocr_service, OcrServiceList::Owocr);
        assert_eq!(loaded.camera_index, 2);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("config.json"), r#"{ "camera_index": 3 }"#).unwrap();

        let loaded = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.camera_index, 3);
        assert_eq!(loaded.ocr_language, "jpn");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("config.json"), "not json").unwrap();

        assert!(AppConfig::load_from(dir.path()).is_err());
    }

    #[test]
    fn card_colour_falls_back_to_new() {
        let config = AppConfig::default();
        assert_eq!(config.card_colour(None), config.card_colour(Some(CardState::New)));
    }
}
