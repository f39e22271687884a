use anyhow::{Context, Result};
use eframe::egui;

use crate::{
    capture::CaptureController,
    config::{create_camera, Config},
    services::Services,
    EframeApp,
};

pub fn show_config_window(app: &mut EframeApp, ctx: &egui::Context) {
    egui::CentralPanel::default().show(ctx, |ui| {
        egui_extras::StripBuilder::new(ui)
            .size(egui_extras::Size::remainder())
            .size(egui_extras::Size::exact(0.0))
            .size(egui_extras::Size::exact(22.0))
            .vertical(|mut strip| {
                strip.cell(|ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        let header_size = 24.0;

                        ui.label(
                            egui::RichText::new(concat!(env!("CARGO_PKG_NAME"), " Configuration"))
                                .size(header_size)
                                .strong(),
                        );

                        app.config.show_ui(ui);

                        ui.separator();

                        egui::CollapsingHeader::new(
                            egui::RichText::new(format!("OCR: {}", app.config.ocr_service.name()))
                                .size(header_size),
                        )
                        .default_open(true)
                        .show_unindented(ui, |ui| {
                            app.services.ocr.show_config_ui(ui);
                        });

                        ui.separator();

                        egui::CollapsingHeader::new(
                            egui::RichText::new(format!(
                                "Vocabulary: {}",
                                app.services.vocabulary.name()
                            ))
                            .size(header_size),
                        )
                        .default_open(true)
                        .show_unindented(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.label("API Key:");
                                ui.add(
                                    egui::TextEdit::singleline(&mut app.api_key_input)
                                        .password(true)
                                        .desired_width(320.0),
                                );
                            });
                            ui.label(
                                egui::RichText::new(
                                    "Without an API key words are split on whitespace and cannot be looked up.",
                                )
                                .weak(),
                            );

                            app.services.vocabulary.show_config_ui(ui);
                        });
                    });
                });

                strip.empty();

                strip.cell(|ui| {
                    ui.columns_const(|[back, save]| {
                        back.centered_and_justified(|ui| {
                            if ui.button("Back").clicked() {
                                app.show_config = false;
                            }
                        });

                        save.centered_and_justified(|ui| {
                            if ui.button("Save and Reload Services").clicked() {
                                match save_and_reload(app) {
                                    Ok(()) => app.show_config = false,
                                    Err(e) => app.popups.error(e),
                                }
                            }
                        });
                    });
                });
            });
    });
}

/// Persist every configuration file and recreate the services and camera from them.
fn save_and_reload(app: &mut EframeApp) -> Result<()> {
    app.services
        .vocabulary
        .set_api_key(app.api_key_input.trim().to_owned());

    // terminating saves the service configuration, which the new services then load
    app.services
        .ocr
        .terminate()
        .context("Failed to save OCR service configuration")?;
    app.services
        .vocabulary
        .terminate()
        .context("Failed to save vocabulary service configuration")?;
    app.config
        .save()
        .context("Failed to save main configuration file")?;

    app.services = Services::new(&app.config)?;

    let was_streaming = app.ocr_window.capture.is_streaming();
    app.ocr_window.capture =
        CaptureController::new(create_camera(&app.config), app.config.facing_mode);
    if was_streaming {
        app.ocr_window.capture.start();
    }

    app.ocr_window.refresh_vocabulary(&mut app.services);

    log::info!("Configuration saved and services reloaded");

    Ok(())
}
