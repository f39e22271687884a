use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use eframe::{egui, CreationContext};

use capture::CaptureController;
use config::{create_camera, AppConfig, Config};
use gui::{config_window::show_config_window, ocr_window::OcrWindow, popups::Popups};
use services::Services;

mod capture;
mod config;
mod gui;
mod services;
mod session;
mod word;

pub const WINDOW_TITLE: &str = "snapjisho";

/// Photograph Japanese text and look up the words in it.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Read this image instead of starting the camera.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Camera to use, overriding the configuration file.
    #[arg(long)]
    camera_index: Option<u32>,
}

fn main() -> Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load().context("Could not load main configuration file")?;
    if let Some(camera_index) = args.camera_index {
        config.camera_index = camera_index;
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([config.window_width as f32, config.window_height as f32])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |cc| {
            let app = EframeApp::new(cc, config, args.image)?;
            Ok(Box::new(app) as Box<dyn eframe::App>)
        }),
    )
    .map_err(|e| anyhow!("{e}"))
}

pub struct EframeApp {
    pub config: AppConfig,
    pub services: Services,
    pub popups: Popups,

    pub show_config: bool,
    /// Contents of the API key field in the configuration window.
    pub api_key_input: String,

    pub ocr_window: OcrWindow,
}

impl EframeApp {
    pub fn new(cc: &CreationContext, config: AppConfig, image: Option<PathBuf>) -> Result<Self> {
        gui::configure_fonts(&cc.egui_ctx);

        let mut services = Services::new(&config)?;

        let capture = CaptureController::new(create_camera(&config), config.facing_mode);
        let mut ocr_window = OcrWindow::new(capture);
        match image {
            Some(path) => {
                log::info!("Reading `{}`", path.display());
                ocr_window.open_path(&path, &config, &mut services);
            }
            None => ocr_window.capture.start(),
        }

        let api_key_input = services
            .vocabulary
            .api_key()
            .unwrap_or_default()
            .to_owned();

        Ok(Self {
            config,
            services,
            popups: Popups::default(),

            show_config: false,
            api_key_input,

            ocr_window,
        })
    }
}

impl eframe::App for EframeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.show_config {
            show_config_window(self, ctx);
        } else {
            self.ocr_window.show(
                ctx,
                &self.config,
                &mut self.services,
                &mut self.popups,
                &mut self.show_config,
            );
        }

        if !self.popups.is_empty() {
            self.popups.show(ctx);
        }
    }
}
