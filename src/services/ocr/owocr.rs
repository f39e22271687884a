use std::io::Cursor;

use anyhow::Context;
use eframe::egui;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::{config::Config, services::ServiceJob};

use super::{OcrError, OcrOutput, OcrService, OcrServiceJob};

/// OCR through a separately running owocr websocket server. Only returns text.
#[derive(Default)]
pub struct Owocr {
    config: OwocrConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwocrConfig {
    address: String,
    port: u16,
}

impl Default for OwocrConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_owned(),
            port: 7331,
        }
    }
}

impl Config for OwocrConfig {
    fn path() -> &'static str {
        "ocr_services/owocr.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.label("Make sure you start owocr separately!");
        ui.horizontal(|ui| {
            ui.label("Address:");
            ui.text_edit_singleline(&mut self.address);
        });
        ui.horizontal(|ui| {
            ui.label("Port:");
            ui.add(egui::DragValue::new(&mut self.port));
        });
    }
}

impl OcrService for Owocr {
    fn name(&self) -> &'static str {
        "owocr"
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.config = OwocrConfig::load().context("Owocr: Failed to load configuration file")?;
        Ok(())
    }

    fn terminate(&mut self) -> anyhow::Result<()> {
        self.config
            .save()
            .context("Owocr: Failed to save configuration file")
    }

    fn show_config_ui(&mut self, ui: &mut egui::Ui) {
        self.config.show_ui(ui);
    }

    fn recognize(&mut self, image: RgbaImage, language: &str) -> OcrServiceJob {
        let addr = format!("ws://{}:{}", self.config.address, self.config.port);
        log::debug!("Owocr: ignoring language `{language}`, owocr picks its own engine");

        ServiceJob::new(move || {
            let connection_error = |source| OcrError::Connection {
                addr: addr.clone(),
                source,
            };

            let mut buf = Cursor::new(Vec::new());
            image.write_to(&mut buf, ImageFormat::Png)?;

            let (mut socket, _) = tungstenite::connect(&addr).map_err(connection_error)?;

            socket
                .send(tungstenite::Message::binary(buf.into_inner()))
                .map_err(connection_error)?;
            // NOTE: owocr sends a text message containing just "True" when the socket is first connected to. we need to consume it
            socket.read().map_err(connection_error)?;
            let text = socket
                .read()
                .map_err(connection_error)?
                .into_text()
                .map_err(connection_error)?;

            if let Err(e) = socket.close(None) {
                log::warn!("Owocr: Failed to close websocket: {e}");
            }

            Ok(OcrOutput {
                text: text.as_str().to_owned(),
                words: None,
            })
        })
    }
}
