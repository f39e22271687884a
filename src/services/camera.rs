use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "camera")]
pub mod nokhwa_camera;

/// Which way the requested camera should face. Only a hint: backends that cannot tell cameras
/// apart use the configured index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacingMode {
    /// Facing away from the user, used to photograph documents.
    Environment,
    User,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera access was denied")]
    PermissionDenied,
    #[error("no camera is available: {0}")]
    Unavailable(String),
    #[error("could not read a frame from the camera: {0}")]
    Frame(String),
    #[error("could not decode image")]
    Decode(#[from] image::ImageError),
}

/// A source of live video frames.
pub trait Camera {
    fn name(&self) -> &'static str;

    /// Open the camera and start streaming.
    fn start(&mut self, facing: FacingMode) -> Result<(), CaptureError>;
    /// Stop streaming and release every track acquired by `start`. Safe to call when stopped.
    fn stop(&mut self);
    fn is_streaming(&self) -> bool;

    /// The newest frame, or `None` if none arrived since the last call. Must not block.
    fn frame(&mut self) -> Result<Option<RgbaImage>, CaptureError>;
}

/// Backend used when the application was built without camera support.
pub struct NoCamera;

impl Camera for NoCamera {
    fn name(&self) -> &'static str {
        "none"
    }

    fn start(&mut self, _facing: FacingMode) -> Result<(), CaptureError> {
        Err(CaptureError::Unavailable(
            "this build has no camera support".to_owned(),
        ))
    }

    fn stop(&mut self) {}

    fn is_streaming(&self) -> bool {
        false
    }

    fn frame(&mut self) -> Result<Option<RgbaImage>, CaptureError> {
        Ok(None)
    }
}

#[cfg(feature = "camera")]
pub fn default_camera(index: u32) -> Box<dyn Camera> {
    Box::new(nokhwa_camera::NokhwaCamera::new(index))
}

#[cfg(not(feature = "camera"))]
pub fn default_camera(_index: u32) -> Box<dyn Camera> {
    Box::new(NoCamera)
}
