use anyhow::Result;
use eframe::egui;
use image::RgbaImage;
use thiserror::Error;

use crate::word::OcrWord;

use super::ServiceJob;

pub mod owocr;
pub mod tesseract;

pub type OcrServiceJob = ServiceJob<Result<OcrOutput, OcrError>>;

pub trait OcrService {
    fn name(&self) -> &'static str;

    /// Initialise the service (ie. load its configuration file, etc).
    fn init(&mut self) -> Result<()>;
    /// Terminate the service (ie. save its configuration file, etc).
    fn terminate(&mut self) -> Result<()>;

    /// Show the config UI for the service's configuration.
    fn show_config_ui(&mut self, ui: &mut egui::Ui);

    /// Extract text in the given language (eg. `jpn`) from an image.
    fn recognize(&mut self, image: RgbaImage, language: &str) -> OcrServiceJob;
}

/// The data returned by an OCR service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrOutput {
    /// Recognised text in reading order, lines separated by whitespace.
    pub text: String,
    /// Individual words with their location in the source image, for services which report them.
    pub words: Option<Vec<OcrWord>>,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("could not encode the image for the OCR engine")]
    Encode(#[from] image::ImageError),
    #[error("could not reach the OCR service at `{addr}`")]
    Connection {
        addr: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("OCR engine failed: {0}")]
    Engine(String),
}
