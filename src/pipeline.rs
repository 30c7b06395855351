//! Request dispatch: fingerprint, cache lookup, resize, persist.
//!
//! Every upload walks the same short state machine:
//!
//! ```text
//! Received ──validate──▶ Resolved(hit)  ──────────────────────────▶ Completed
//!                    └─▶ Resolved(miss) ──resize──▶ persist ──────▶ Completed
//! ```
//!
//! - **Received**: dimensions are checked. The declared format was already
//!   decided at the boundary, so an unsupported type never gets this far.
//! - **Resolved**: the request is fingerprinted and looked up in the
//!   [`MediaStore`]. Lookup, resize and persist all run under the
//!   fingerprint's lock, so concurrent identical uploads compute once.
//! - **Completed**: the caller gets a storage-relative path or an error.
//!   There is no partial outcome.
//!
//! Format dispatch is a `match` on [`DeclaredFormat`]: JPEG and PNG go to
//! [`ImageBackend::resize_static`], GIF to [`ImageBackend::resize_animated`].
//!
//! The pipeline is generic over [`ImageBackend`] so tests can count backend
//! calls with a recording mock.

use crate::cache::MediaStore;
use crate::config::ServiceConfig;
use crate::fingerprint::fingerprint_request;
use crate::imaging::{
    AnimatedParams, BackendError, ImageBackend, Quality, RequestedSize, ResourceLimits,
    RustBackend, StaticParams,
};
use crate::types::{DeclaredFormat, ResizeRequest, UnsupportedFormat};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Input too large: {0}")]
    TooLarge(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Decode(msg) => Self::Decode(msg),
            BackendError::Encode(msg) => Self::Encode(msg),
            BackendError::TooLarge(msg) => Self::TooLarge(msg),
            BackendError::InvalidDimensions(msg) => Self::InvalidDimensions(msg),
        }
    }
}

/// Knobs the pipeline needs from the service config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub quality: Quality,
    /// Input and output ceilings; `max_output_dimension` also bounds the
    /// requested axes.
    pub limits: ResourceLimits,
    /// Prefix of the returned storage-relative path.
    pub url_prefix: String,
}

impl PipelineSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            quality: config.images.quality(),
            limits: config.images.resource_limits(),
            url_prefix: config.storage.url_prefix.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

/// Terminal state of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Storage-relative path handed back to the client (`media/<fp>.jpg`).
    pub path: String,
    /// Where the file lives on disk.
    pub file: PathBuf,
    /// `true` when no resize work was done for this request.
    pub cache_hit: bool,
}

/// The resize-and-cache pipeline. Built once and shared by every request.
pub struct Pipeline<B: ImageBackend> {
    store: MediaStore,
    backend: B,
    settings: PipelineSettings,
}

impl Pipeline<RustBackend> {
    /// Build the production pipeline: open the storage root from config and
    /// use the pure-Rust backend.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, PipelineError> {
        let store = MediaStore::open(&config.storage.root)?;
        Ok(Self::new(
            store,
            RustBackend::new(),
            PipelineSettings::from_config(config),
        ))
    }
}

impl<B: ImageBackend> Pipeline<B> {
    pub fn new(store: MediaStore, backend: B, settings: PipelineSettings) -> Self {
        Self {
            store,
            backend,
            settings,
        }
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one request to completion.
    pub fn handle(&self, request: &ResizeRequest) -> Result<Resolved, PipelineError> {
        self.validate(request)?;

        let fingerprint = fingerprint_request(request);
        let extension = request.format.storage_extension(&request.source_name);

        self.store.with_fingerprint_lock(&fingerprint, || {
            let lookup = self.store.resolve(&fingerprint, &extension);
            let path = self.public_path(&lookup.file_name);

            if lookup.cache_hit {
                info!(
                    source = %request.source_name,
                    %fingerprint,
                    path = %path,
                    stats = %self.store.stats(),
                    "cache hit"
                );
                return Ok(Resolved {
                    path,
                    file: lookup.path,
                    cache_hit: true,
                });
            }

            let started = Instant::now();
            let bytes = self.resize(request).inspect_err(|e| {
                warn!(source = %request.source_name, %fingerprint, error = %e, "resize failed");
            })?;

            self.store
                .persist(&lookup.path, &bytes)
                .map_err(|e| PipelineError::Encode(format!("failed to store result: {e}")))?;

            info!(
                source = %request.source_name,
                %fingerprint,
                path = %path,
                bytes = bytes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                stats = %self.store.stats(),
                "resized"
            );
            Ok(Resolved {
                path,
                file: lookup.path,
                cache_hit: false,
            })
        })
    }

    fn validate(&self, request: &ResizeRequest) -> Result<(), PipelineError> {
        let (width, height) = (request.width, request.height);
        if width == 0 && height == 0 {
            return Err(PipelineError::InvalidDimensions(
                "width and height cannot both be 0".into(),
            ));
        }
        let max = self.settings.limits.max_output_dimension;
        if width > max || height > max {
            return Err(PipelineError::InvalidDimensions(format!(
                "requested {width}x{height} exceeds the maximum dimension of {max}"
            )));
        }
        Ok(())
    }

    fn resize(&self, request: &ResizeRequest) -> Result<Vec<u8>, PipelineError> {
        let size = RequestedSize::new(request.width, request.height);
        debug!(
            format = %request.format,
            width = request.width,
            height = request.height,
            bytes = request.content.len(),
            "cache miss, resizing"
        );

        let bytes = match request.format {
            DeclaredFormat::Jpeg | DeclaredFormat::Png => self.backend.resize_static(
                &request.content,
                &StaticParams {
                    format: request.format,
                    size,
                    quality: self.settings.quality,
                    limits: self.settings.limits,
                },
            )?,
            DeclaredFormat::Gif => self.backend.resize_animated(
                &request.content,
                &AnimatedParams {
                    size,
                    limits: self.settings.limits,
                },
            )?,
        };
        Ok(bytes)
    }

    fn public_path(&self, file_name: &str) -> String {
        let prefix = self.settings.url_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }
}
