//! Fetch worker — resolves an image source into a local raster file.
//!
//! Runs on its own thread so the blocking download never touches the UI
//! tick. The download itself goes through the `Fetcher` trait; the
//! production implementation shells out to curl. This is the seam that
//! talks to the network — tests inject a mock here.
//!
//! Exactly one fetch worker may run per panel; the driver rejects a second
//! request while one is in flight.

use crate::source::ImageSource;
use crate::state::{AcquisitionState, RasterResource, StateCell};
use crate::store::ResourceStore;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// The per-cycle fetch failure taxonomy. Terminal — no automatic retry;
/// the display strings are the user-facing notices the host shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FetchErrorKind {
    #[error("Please enter an image URL.")]
    NoUrl,
    #[error("Failed to get animal data.")]
    Api,
    #[error("Failed to get image URL from API.")]
    UrlExtract,
    #[error("Failed to get image.")]
    Download,
}

impl FetchErrorKind {
    /// The state a worker writes for this failure.
    pub fn state(&self) -> AcquisitionState {
        match self {
            FetchErrorKind::NoUrl => AcquisitionState::NoUrlError,
            FetchErrorKind::Api => AcquisitionState::ApiError,
            FetchErrorKind::UrlExtract => AcquisitionState::UrlExtractError,
            FetchErrorKind::Download => AcquisitionState::DownloadError,
        }
    }

    /// Inverse of [`FetchErrorKind::state`], for the driver consuming a
    /// terminal error value.
    pub fn from_state(state: AcquisitionState) -> Option<Self> {
        match state {
            AcquisitionState::NoUrlError => Some(FetchErrorKind::NoUrl),
            AcquisitionState::ApiError => Some(FetchErrorKind::Api),
            AcquisitionState::UrlExtractError => Some(FetchErrorKind::UrlExtract),
            AcquisitionState::DownloadError => Some(FetchErrorKind::Download),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchPrimitiveError {
    #[error("download utility not found: {0}")]
    UtilityNotFound(String),
    #[error("failed to run download utility: {0}")]
    Spawn(std::io::Error),
    #[error("download produced no output file")]
    NoOutput,
}

/// Blocking "fetch URL to local file" primitive. A single failure is
/// terminal for the cycle — no retry.
pub trait Fetcher: Send + Sync {
    fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<(), FetchPrimitiveError>;
}

/// Production fetcher: shells out to curl, located on PATH at construction.
pub struct CurlFetcher {
    binary: PathBuf,
}

impl CurlFetcher {
    pub fn new() -> Result<Self, FetchPrimitiveError> {
        let binary = which::which("curl")
            .map_err(|e| FetchPrimitiveError::UtilityNotFound(e.to_string()))?;
        Ok(Self { binary })
    }

    /// Use a specific download binary instead of curl from PATH.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl Fetcher for CurlFetcher {
    fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<(), FetchPrimitiveError> {
        let status = Command::new(&self.binary)
            .arg("-s")
            .arg("-L")
            .arg("-o")
            .arg(dest)
            .arg(url)
            .status()
            .map_err(FetchPrimitiveError::Spawn)?;
        // curl may still write a body on an HTTP error status; the contract
        // is file existence, matching the external utility's observable
        // behavior.
        if !dest.exists() {
            log::debug!("[FETCH] curl exit {:?}, no output file", status.code());
            return Err(FetchPrimitiveError::NoOutput);
        }
        Ok(())
    }
}

/// Escape characters the download utility's command-line form cannot take
/// raw: spaces become `%20`, ampersands get the shell escape.
pub fn escape_url(url: &str) -> String {
    url.replace(' ', "%20").replace('&', "^&")
}

/// Derive the file extension from a (already escaped) URL: the text after
/// the final dot, truncated at the first query-string, fragment, escape, or
/// shell-escape character.
pub fn derive_extension(url: &str) -> String {
    let tail = url.rsplit('.').next().unwrap_or(url);
    let cut = tail
        .find(['?', '#', '%', '&', '^'])
        .unwrap_or(tail.len());
    tail[..cut].to_string()
}

/// Worker body: resolve `source` to an image URL, download it, and write
/// the terminal state for generation `generation`. Runs off the UI thread.
pub fn run_fetch(
    source: ImageSource,
    fetcher: Arc<dyn Fetcher>,
    store: ResourceStore,
    cell: Arc<StateCell>,
    generation: u64,
) {
    match resolve_and_download(&source, fetcher.as_ref(), &store) {
        Ok(raster) => {
            log::info!("[FETCH] downloaded {} ({})", raster.path.display(), raster.ext);
            let path = raster.path.clone();
            if !cell.complete(generation, AcquisitionState::ImageReady, Some(raster)) {
                // Superseded cycle: the driver will never consume this
                // raster, so its transients are ours to remove.
                log::debug!("[FETCH] removing superseded download {}", path.display());
                let _ = std::fs::remove_file(&path);
                let _ = std::fs::remove_file(store.api_response_path());
            }
        }
        Err(kind) => {
            log::warn!("[FETCH] cycle failed: {:?}", kind);
            if !cell.complete(generation, kind.state(), None) {
                let _ = std::fs::remove_file(store.api_response_path());
            }
        }
    }
}

fn resolve_and_download(
    source: &ImageSource,
    fetcher: &dyn Fetcher,
    store: &ResourceStore,
) -> Result<RasterResource, FetchErrorKind> {
    let url = match source {
        ImageSource::StaticEndpoint(endpoint) => {
            let response_path = store.api_response_path();
            fetcher
                .fetch_to_file(endpoint.url(), &response_path)
                .map_err(|e| {
                    log::warn!("[FETCH] endpoint request failed: {}", e);
                    FetchErrorKind::Api
                })?;
            let raw = std::fs::read_to_string(&response_path)
                .map_err(|_| FetchErrorKind::Api)?;
            // A payload that doesn't parse has the same standing as one
            // missing the expected field: no URL came out of it.
            let payload: serde_json::Value =
                serde_json::from_str(&raw).map_err(|_| FetchErrorKind::UrlExtract)?;
            endpoint
                .extract_image_url(&payload)
                .ok_or(FetchErrorKind::UrlExtract)?
        }
        ImageSource::CustomUrl(url) => {
            if url.is_empty() {
                return Err(FetchErrorKind::NoUrl);
            }
            url.clone()
        }
        other => {
            // Local files, pastes, and capture never reach the fetch
            // worker; the driver applies or captures them directly.
            log::warn!("[FETCH] unsupported source for fetch: {:?}", other);
            return Err(FetchErrorKind::NoUrl);
        }
    };

    let escaped = escape_url(&url);
    let ext = derive_extension(&escaped);
    let dest = store.downloaded_image_path(&ext);
    log::info!("[FETCH] downloading {} -> {}", escaped, dest.display());
    fetcher.fetch_to_file(&escaped, &dest).map_err(|e| {
        log::warn!("[FETCH] download failed: {}", e);
        // The utility may leave a partial body behind.
        let _ = std::fs::remove_file(&dest);
        FetchErrorKind::Download
    })?;
    Ok(RasterResource::new(dest, ext))
}
