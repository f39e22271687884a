use std::{io::Cursor, path::Path};

use image::{ImageFormat, RgbaImage};

use crate::services::camera::{Camera, CaptureError, FacingMode};

/// A still image waiting to be, or already, read by OCR.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// The image as it was captured or uploaded.
    pub encoded: Vec<u8>,
    pub image: RgbaImage,
}

impl CapturedImage {
    pub fn from_frame(image: RgbaImage) -> Result<Self, CaptureError> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(Self {
            encoded: buf.into_inner(),
            image,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CaptureError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self {
            encoded: bytes.to_vec(),
            image,
        })
    }

    /// Size of the image in pixels, before any scaling for display.
    pub fn natural_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Owns the camera and turns its frames, or uploaded files, into [`CapturedImage`]s.
///
/// Failures never leave this type: they are kept as a message for the user instead.
pub struct CaptureController {
    camera: Box<dyn Camera>,
    facing: FacingMode,
    preview: Option<RgbaImage>,
    error: Option<String>,
}

impl CaptureController {
    pub fn new(camera: Box<dyn Camera>, facing: FacingMode) -> Self {
        Self {
            camera,
            facing,
            preview: None,
            error: None,
        }
    }

    /// Start streaming from the camera.
    pub fn start(&mut self) {
        self.error = None;
        if let Err(e) = self.camera.start(self.facing) {
            log::warn!("Could not start camera `{}`: {e}", self.camera.name());
            self.preview = None;
            self.error = Some(match e {
                CaptureError::PermissionDenied => {
                    "Camera access was denied. Allow access to the camera, or open an image instead."
                        .to_owned()
                }
                CaptureError::Unavailable(_) => {
                    "No camera is available. Open an image instead.".to_owned()
                }
                e => format!("Could not start the camera: {e}"),
            });
        }
    }

    /// Release the camera.
    pub fn stop(&mut self) {
        self.camera.stop();
        self.preview = None;
    }

    pub fn is_streaming(&self) -> bool {
        self.camera.is_streaming()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pick up the newest frame from the camera, if streaming. Never waits for one: the last
    /// frame is kept while the camera has nothing new.
    pub fn poll_frame(&mut self) -> Option<&RgbaImage> {
        if !self.camera.is_streaming() {
            return None;
        }

        match self.camera.frame() {
            Ok(Some(frame)) => self.preview = Some(frame),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Dropping camera frame: {e}");
            }
        }

        self.preview.as_ref()
    }

    /// Snapshot the current frame. Does nothing if no frame is available.
    ///
    /// The camera is released once a still has been taken.
    pub fn capture(&mut self) -> Option<CapturedImage> {
        if self.preview.is_none() {
            self.poll_frame();
        }
        let frame = self.preview.take()?;

        match CapturedImage::from_frame(frame) {
            Ok(captured) => {
                log::info!(
                    "Captured {}x{} frame",
                    captured.image.width(),
                    captured.image.height()
                );
                self.stop();
                Some(captured)
            }
            Err(e) => {
                log::error!("Could not encode captured frame: {e}");
                self.error = Some("Could not take a photo, please try again.".to_owned());
                None
            }
        }
    }

    /// Use an image supplied by the user instead of the camera.
    pub fn load_from_file(&mut self, bytes: &[u8]) -> Option<CapturedImage> {
        match CapturedImage::decode(bytes) {
            Ok(captured) => {
                self.error = None;
                self.stop();
                Some(captured)
            }
            Err(e) => {
                log::warn!("Could not decode uploaded image: {e}");
                self.error = Some("This file could not be opened as an image.".to_owned());
                None
            }
        }
    }

    pub fn load_from_path(&mut self, path: &Path) -> Option<CapturedImage> {
        match std::fs::read(path) {
            Ok(bytes) => self.load_from_file(&bytes),
            Err(e) => {
                log::warn!("Could not read `{}`: {e}", path.display());
                self.error = Some(format!("Could not read `{}`.", path.display()));
                None
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.camera.stop();
    }
}
