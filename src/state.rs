//! Acquisition state — the single value workers and the driver coordinate on.
//!
//! One `StateCell` exists per panel. Workers write it exactly once, at their
//! terminal step; the status driver consumes terminal values exactly once per
//! tick and resets to the cycle's baseline. Every cycle is stamped with a
//! generation id so a terminal write from a superseded worker (the target
//! changed while it was still blocking) is discarded instead of applied.

use std::path::PathBuf;
use std::sync::Mutex;

/// Where the panel's acquisition machinery currently stands.
///
/// `FetchInFlight` and `CaptureArmed` are in-flight values the driver
/// observes without acting on; everything after them is terminal and
/// consumed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    FetchInFlight,
    ImageReady,
    NoUrlError,
    ApiError,
    UrlExtractError,
    DownloadError,
    CaptureArmed,
    CaptureDone,
}

impl AcquisitionState {
    /// True for values that a worker wrote as its final step and that the
    /// driver must consume-and-reset.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionState::ImageReady
                | AcquisitionState::NoUrlError
                | AcquisitionState::ApiError
                | AcquisitionState::UrlExtractError
                | AcquisitionState::DownloadError
                | AcquisitionState::CaptureDone
        )
    }

    /// Baseline state after this terminal value is consumed.
    fn baseline(&self) -> AcquisitionState {
        match self {
            AcquisitionState::CaptureDone => AcquisitionState::CaptureArmed,
            _ => AcquisitionState::Idle,
        }
    }
}

/// A produced image waiting to be applied to the display canvas: the backing
/// file plus its source extension (used to name and clean up the transient).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterResource {
    pub path: PathBuf,
    pub ext: String,
}

impl RasterResource {
    pub fn new(path: PathBuf, ext: impl Into<String>) -> Self {
        Self { path, ext: ext.into() }
    }
}

struct Inner {
    state: AcquisitionState,
    pending: Option<RasterResource>,
    generation: u64,
}

/// Mutex-guarded `{state, pending raster, generation}` slot shared between
/// the driver and at most one fetch and one capture worker.
pub struct StateCell {
    inner: Mutex<Inner>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: AcquisitionState::Idle,
                pending: None,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A worker can only panic between lock and unlock by OOM; recover
        // the data rather than poisoning the whole panel.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state, for in-flight observation.
    pub fn state(&self) -> AcquisitionState {
        self.lock().state
    }

    /// Generation of the current cycle.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Start a fetch cycle. Rejected while a fetch is already in flight —
    /// the in-flight state is left untouched and the caller surfaces a
    /// "please wait" notice. Returns the new cycle's generation.
    pub fn try_begin_fetch(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.state == AcquisitionState::FetchInFlight {
            return None;
        }
        inner.generation += 1;
        inner.state = AcquisitionState::FetchInFlight;
        inner.pending = None;
        log::debug!("[STATE] fetch cycle begun (generation {})", inner.generation);
        Some(inner.generation)
    }

    /// Arm capture. Supersedes whatever was in flight; a stale worker's
    /// terminal write will carry an old generation and be discarded.
    pub fn arm_capture(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = AcquisitionState::CaptureArmed;
        inner.pending = None;
        log::debug!("[STATE] capture armed (generation {})", inner.generation);
        inner.generation
    }

    /// Stamp the next capture cycle with its own generation while capture
    /// stays armed. A cycle issued before a target switch then carries an
    /// older generation than the switch and is discarded on completion.
    pub fn begin_capture_cycle(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        log::debug!(
            "[STATE] capture cycle begun (generation {})",
            inner.generation
        );
        inner.generation
    }

    /// Reset to `Idle`, superseding any in-flight cycle. Used when the host
    /// switches away from a source.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = AcquisitionState::Idle;
        inner.pending = None;
    }

    /// Present an already-available raster (local file, clipboard paste)
    /// directly as a terminal `ImageReady`, bypassing the workers.
    pub fn present(&self, raster: RasterResource) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = AcquisitionState::ImageReady;
        inner.pending = Some(raster);
    }

    /// Terminal write from a worker. Ignored (returns false) when the
    /// worker's cycle has been superseded.
    pub fn complete(
        &self,
        generation: u64,
        state: AcquisitionState,
        raster: Option<RasterResource>,
    ) -> bool {
        debug_assert!(state.is_terminal());
        let mut inner = self.lock();
        if inner.generation != generation {
            log::debug!(
                "[STATE] discarding stale terminal write {:?} (generation {} superseded by {})",
                state,
                generation,
                inner.generation
            );
            return false;
        }
        inner.state = state;
        inner.pending = raster;
        true
    }

    /// Consume a terminal value, atomically resetting to its baseline.
    /// Returns `None` while the cell holds a non-terminal state, which makes
    /// repeated ticks during an in-flight cycle a safe no-op.
    pub fn take_terminal(&self) -> Option<(AcquisitionState, Option<RasterResource>)> {
        let mut inner = self.lock();
        if !inner.state.is_terminal() {
            return None;
        }
        let state = inner.state;
        inner.state = state.baseline();
        Some((state, inner.pending.take()))
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
