use std::sync::{Arc, Mutex};

use image::{DynamicImage, RgbImage, RgbaImage};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Buffer, CallbackCamera, NokhwaError,
};

use super::{Camera, CaptureError, FacingMode};

/// The newest decoded frame, waiting to be picked up by the UI thread.
type LatestFrame = Arc<Mutex<Option<Result<RgbaImage, String>>>>;

/// Native camera access through nokhwa. Frames are grabbed and decoded on nokhwa's capture
/// thread, `frame` only takes the newest one.
pub struct NokhwaCamera {
    index: u32,
    camera: Option<CallbackCamera>,
    latest: LatestFrame,
}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            camera: None,
            latest: Arc::default(),
        }
    }
}

fn classify(e: NokhwaError) -> CaptureError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Unavailable(message)
    }
}

fn decode(buffer: &Buffer) -> Result<RgbaImage, String> {
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| e.to_string())?;

    let (width, height) = (decoded.width(), decoded.height());
    let rgb = RgbImage::from_raw(width, height, decoded.into_raw())
        .ok_or_else(|| "frame buffer has the wrong size".to_owned())?;

    Ok(DynamicImage::ImageRgb8(rgb).to_rgba8())
}

impl Camera for NokhwaCamera {
    fn name(&self) -> &'static str {
        "nokhwa"
    }

    fn start(&mut self, facing: FacingMode) -> Result<(), CaptureError> {
        if self.camera.is_some() {
            return Ok(());
        }

        // nokhwa cannot query which way a device faces, the configured index wins
        log::debug!(
            "Opening camera {} (requested facing mode: {facing:?})",
            self.index
        );

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let latest = Arc::clone(&self.latest);
        let mut camera =
            CallbackCamera::new(CameraIndex::Index(self.index), requested, move |buffer| {
                let frame = decode(&buffer);
                if let Ok(mut latest) = latest.lock() {
                    *latest = Some(frame);
                }
            })
            .map_err(classify)?;
        camera.open_stream().map_err(classify)?;

        log::info!("Camera {} streaming", self.index);
        self.camera = Some(camera);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera stream: {e}");
            }
            log::info!("Camera {} released", self.index);
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }

    fn is_streaming(&self) -> bool {
        self.camera.is_some()
    }

    fn frame(&mut self) -> Result<Option<RgbaImage>, CaptureError> {
        if self.camera.is_none() {
            return Ok(None);
        }

        let frame = self
            .latest
            .lock()
            .map_err(|_| CaptureError::Frame("capture thread panicked".to_owned()))?
            .take();

        frame.transpose().map_err(CaptureError::Frame)
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
