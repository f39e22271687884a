use std::collections::HashMap;

use anyhow::Context;
use eframe::egui;
use image::{ImageFormat, RgbaImage};
use rusty_tesseract::{Args, Data};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    services::ServiceJob,
    word::{BoundingBox, OcrWord},
};

use super::{OcrError, OcrOutput, OcrService, OcrServiceJob};

/// Tesseract's TSV level for single words.
const WORD_LEVEL: i32 = 5;

/// OCR with a locally installed `tesseract` binary. Reports word positions and confidences.
#[derive(Default)]
pub struct Tesseract {
    config: TesseractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    pub psm: i32,
    pub dpi: i32,
    /// Words recognised with a lower confidence are dropped.
    pub min_confidence: f32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            psm: 3,
            dpi: 150,
            min_confidence: 30.0,
        }
    }
}

impl Config for TesseractConfig {
    fn path() -> &'static str {
        "ocr_services/tesseract.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.label("Requires tesseract and its `jpn` language data to be installed.");
        ui.horizontal(|ui| {
            ui.label("Page Segmentation Mode:");
            ui.add(egui::DragValue::new(&mut self.psm).range(0..=13));
        });
        ui.horizontal(|ui| {
            ui.label("DPI:");
            ui.add(egui::DragValue::new(&mut self.dpi).range(70..=2400));
        });
        ui.horizontal(|ui| {
            ui.label("Minimum Confidence:");
            ui.add(egui::Slider::new(&mut self.min_confidence, 0.0..=100.0));
        });
    }
}

impl OcrService for Tesseract {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.config =
            TesseractConfig::load().context("Tesseract: Failed to load configuration file")?;
        Ok(())
    }

    fn terminate(&mut self) -> anyhow::Result<()> {
        self.config
            .save()
            .context("Tesseract: Failed to save configuration file")
    }

    fn show_config_ui(&mut self, ui: &mut egui::Ui) {
        self.config.show_ui(ui);
    }

    fn recognize(&mut self, image: RgbaImage, language: &str) -> OcrServiceJob {
        let config = self.config.clone();
        let language = language.to_owned();

        ServiceJob::new(move || {
            // the tesseract binary reads from disk, the file lives until the end of this job
            let file = tempfile::Builder::new()
                .prefix("snapjisho-")
                .suffix(".png")
                .tempfile()
                .map_err(|e| OcrError::Engine(format!("could not create temporary file: {e}")))?;
            image.save_with_format(file.path(), ImageFormat::Png)?;

            let input = rusty_tesseract::Image::from_path(file.path())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            let args = Args {
                lang: language,
                config_variables: HashMap::from([(
                    "preserve_interword_spaces".to_owned(),
                    "1".to_owned(),
                )]),
                dpi: Some(config.dpi),
                psm: Some(config.psm),
                ..Args::default()
            };

            let output = rusty_tesseract::image_to_data(&input, &args)
                .map_err(|e| OcrError::Engine(e.to_string()))?;

            let output = output_from_rows(&output.data, config.min_confidence);
            log::debug!(
                "Tesseract: recognised {} words",
                output.words.as_ref().map_or(0, Vec::len)
            );
            Ok(output)
        })
    }
}

/// Collects word rows into an [`OcrOutput`], rebuilding the text line by line.
///
/// Japanese is often reported one character per row, so rows of a line are only separated by a
/// space where the image shows a gap of at least a quarter of the text height.
fn output_from_rows(rows: &[Data], min_confidence: f32) -> OcrOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut previous: Option<BoundingBox> = None;
    let mut words = Vec::new();
    let mut current_line = None;

    for row in rows {
        let text = row.text.trim();
        if row.level != WORD_LEVEL || text.is_empty() || row.conf < min_confidence {
            continue;
        }

        let left = row.left.max(0) as u32;
        let top = row.top.max(0) as u32;
        let bbox = BoundingBox {
            x0: left,
            y0: top,
            x1: left + row.width.max(0) as u32,
            y1: top + row.height.max(0) as u32,
        };

        let line_id = (row.page_num, row.block_num, row.par_num, row.line_num);
        if current_line != Some(line_id) {
            lines.push(String::new());
            current_line = Some(line_id);
            previous = None;
        }
        if let Some(line) = lines.last_mut() {
            if previous.is_some_and(|previous| is_word_gap(&previous, &bbox)) {
                line.push(' ');
            }
            line.push_str(text);
        }
        previous = Some(bbox);

        words.push(OcrWord {
            text: text.to_owned(),
            bbox: Some(bbox),
            confidence: Some(row.conf),
        });
    }

    let text = lines.join("\n");

    OcrOutput {
        text,
        words: Some(words),
    }
}

fn is_word_gap(previous: &BoundingBox, next: &BoundingBox) -> bool {
    let height = previous
        .y1
        .saturating_sub(previous.y0)
        .max(next.y1.saturating_sub(next.y0));
    next.x0.saturating_sub(previous.x1) * 4 >= height
}
