use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use ocr::OcrService;
use vocabulary::VocabularyService;

use crate::config::AppConfig;

pub mod camera;
pub mod ocr;
pub mod vocabulary;

/// Holds instanciated services.
pub struct Services {
    pub ocr: Box<dyn OcrService>,
    pub vocabulary: Box<dyn VocabularyService>,
}

impl Services {
    /// Create a new `Services` from the services specified in the given `AppConfig`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut services = Self {
            ocr: config.ocr_service.create_service(),
            vocabulary: Box::new(vocabulary::jpdb::JpdbVocabulary::default()),
        };

        services
            .ocr
            .init()
            .with_context(|| format!("Failed to initialise OCR service `{}`", services.ocr.name()))?;
        services.vocabulary.init().with_context(|| {
            format!(
                "Failed to initialise vocabulary service `{}`",
                services.vocabulary.name()
            )
        })?;

        log::info!(
            "Services ready: OCR `{}`, vocabulary `{}` ({})",
            services.ocr.name(),
            services.vocabulary.name(),
            match services.vocabulary.api_key() {
                Some(_) => "API key configured",
                None => "no API key, using fallback segmentation",
            }
        );

        Ok(services)
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        if let Err(e) = self.ocr.terminate() {
            log::error!("Failed to terminate OCR service: {e:?}");
        }
        if let Err(e) = self.vocabulary.terminate() {
            log::error!("Failed to terminate vocabulary service: {e:?}");
        }
    }
}

/// A job being performed by a service on a background thread. May or may not be finished.
pub struct ServiceJob<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> ServiceJob<T> {
    pub fn new<F: FnOnce() -> T + Send + 'static>(f: F) -> Self {
        std::thread::spawn(f).into()
    }
}

impl<T> ServiceJob<T> {
    /// Get the return value of this `ServiceJob` if it was finished.
    ///
    /// - Returns `Err` if the job has already finished and its return value was taken previously,
    ///   or if the job panicked;
    /// - Returns `Ok(None)` if the job has not finished yet;
    /// - Returns `Ok(Some(T))` if the job has finished.
    pub fn try_wait(&mut self) -> Result<Option<T>> {
        match &self.handle {
            None => Err(anyhow!("job already finished")),
            Some(handle) if !handle.is_finished() => Ok(None),
            Some(_) => {
                let handle = self
                    .handle
                    .take()
                    .ok_or_else(|| anyhow!("job already finished"))?;
                handle
                    .join()
                    .map(Some)
                    .map_err(|_| anyhow!("job panicked"))
            }
        }
    }
}

impl<T> From<JoinHandle<T>> for ServiceJob<T> {
    fn from(handle: JoinHandle<T>) -> Self {
        ServiceJob {
            handle: Some(handle),
        }
    }
}
