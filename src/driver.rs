//! Status driver — the tick-polled dispatcher at the center of the panel.
//!
//! The host calls `tick()` every UI frame (and from input handlers); each
//! call performs at most one image-apply or error-surface action. The driver
//! is the only consumer of worker terminal states: it reads the shared cell
//! once per tick, applies or surfaces what it finds, and resets the cycle.
//! It never blocks — workers do their blocking I/O on their own threads and
//! hand results back purely by writing the state cell.

use crate::capture::{self, CaptureSession, WindowBackend};
use crate::clipboard;
use crate::compositor::DisplayCanvas;
use crate::fetch::{self, FetchErrorKind, Fetcher};
use crate::source::ImageSource;
use crate::state::{AcquisitionState, RasterResource, StateCell};
use crate::store::ResourceStore;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What a tick did, for the host to react to. `Error` maps to a blocking
/// notice with the error's display message; the panel itself stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    None,
    ImageApplied,
    Error(FetchErrorKind),
}

/// Rejection of a host request, surfaced as a notice without disturbing
/// whatever is in flight.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Please wait for the current image to load.")]
    Busy,
    #[error(transparent)]
    Clipboard(#[from] clipboard::ClipboardError),
    #[error("failed to persist pasted image: {0}")]
    Persist(#[from] image::ImageError),
}

/// Bounded counter stepped once per tick, reversing direction at its
/// inclusive bounds. Its value pads capture dimensions by a small cosmetic
/// margin; nothing else observes it.
struct Oscillator {
    value: i32,
    min: i32,
    max: i32,
    descending: bool,
}

impl Oscillator {
    fn new(min: i32, max: i32) -> Self {
        Self {
            value: 0,
            min: min.min(max),
            max: max.max(min),
            descending: false,
        }
    }

    fn step(&mut self) -> i32 {
        if self.descending {
            self.value -= 1;
            if self.value <= self.min {
                self.value = self.min;
                self.descending = false;
            }
        } else {
            self.value += 1;
            if self.value >= self.max {
                self.value = self.max;
                self.descending = true;
            }
        }
        self.value
    }

    fn value(&self) -> i32 {
        self.value
    }
}

pub struct StatusDriver {
    cell: Arc<StateCell>,
    store: ResourceStore,
    fetcher: Arc<dyn Fetcher>,
    backend: Arc<dyn WindowBackend>,
    session: Arc<Mutex<CaptureSession>>,
    canvas: DisplayCanvas,
    oscillator: Oscillator,
    source: ImageSource,
    fetch_worker: Option<JoinHandle<()>>,
    capture_worker: Option<JoinHandle<()>>,
    last_capture_issue: Option<Instant>,
    capture_interval: Duration,
}

impl StatusDriver {
    pub fn new(
        store: ResourceStore,
        fetcher: Arc<dyn Fetcher>,
        backend: Arc<dyn WindowBackend>,
        oscillation_bounds: (i32, i32),
        capture_interval: Duration,
        initial_size: (u32, u32),
    ) -> Self {
        let session = Arc::new(Mutex::new(CaptureSession::new(Arc::clone(&backend))));
        Self {
            cell: Arc::new(StateCell::new()),
            store,
            fetcher,
            backend,
            session,
            canvas: DisplayCanvas::new(initial_size.0, initial_size.1),
            oscillator: Oscillator::new(oscillation_bounds.0, oscillation_bounds.1),
            source: ImageSource::CustomUrl(String::new()),
            fetch_worker: None,
            capture_worker: None,
            last_capture_issue: None,
            capture_interval,
        }
    }

    pub fn selected_source(&self) -> &ImageSource {
        &self.source
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.cell.state()
    }

    pub fn canvas(&self) -> &DisplayCanvas {
        &self.canvas
    }

    /// Change the selected source. Arms capture for a capture target;
    /// anything else resets to idle. Either way the generation advances, so
    /// a superseded worker's late result is discarded, and any previously
    /// cached capture handle is released.
    pub fn select_source(&mut self, source: ImageSource) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        match &source {
            ImageSource::CaptureTarget(pid) => {
                session.set_target(*pid);
                drop(session);
                self.store.remove_screenshot();
                self.cell.arm_capture();
                self.last_capture_issue = None;
            }
            _ => {
                session.clear();
                drop(session);
                self.cell.reset();
            }
        }
        log::info!("[PANEL] source selected: {:?}", source);
        self.source = source;
    }

    /// Start a fetch cycle for the selected source. Rejected while a cycle
    /// is in flight or its result has not been consumed yet.
    pub fn request_fetch(&mut self) -> Result<(), RequestError> {
        if !self.source.policy().fetch_enabled {
            log::warn!("[PANEL] fetch requested for non-fetchable source {:?}", self.source);
            return Ok(());
        }
        self.ensure_not_busy()?;
        let generation = self.cell.try_begin_fetch().ok_or(RequestError::Busy)?;

        let source = self.source.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let store = self.store.clone();
        let cell = Arc::clone(&self.cell);
        self.fetch_worker = Some(std::thread::spawn(move || {
            fetch::run_fetch(source, fetcher, store, cell, generation);
        }));
        Ok(())
    }

    /// Apply an image file the user already picked — no worker involved.
    /// The file is the user's; cleanup never deletes it.
    pub fn load_file(&mut self, path: PathBuf) -> Result<(), RequestError> {
        self.ensure_not_busy()?;
        self.leave_capture();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_string();
        self.source = ImageSource::LocalFile(path.clone());
        self.cell.present(RasterResource::new(path, ext));
        Ok(())
    }

    /// Persist the clipboard image as a transient and apply it.
    pub fn paste_clipboard(&mut self) -> Result<(), RequestError> {
        self.ensure_not_busy()?;
        self.leave_capture();
        let image = clipboard::read_image()?;
        let path = self.store.clipboard_path();
        image.save(&path)?;
        log::info!("[PANEL] clipboard image pasted to {}", path.display());
        self.source = ImageSource::ClipboardPaste(path.clone());
        self.cell.present(RasterResource::new(path, "png"));
        Ok(())
    }

    /// One dispatcher pass. Reads the shared state once, performs the
    /// transition-table action for what it finds, and returns what happened
    /// so the host can repaint or surface a notice.
    pub fn tick(&mut self, panel_size: (u32, u32)) -> TickEvent {
        self.oscillator.step();
        self.reap_workers();

        if let Some((state, raster)) = self.cell.take_terminal() {
            return match state {
                AcquisitionState::ImageReady => self.apply_raster(raster, panel_size),
                AcquisitionState::CaptureDone => {
                    let event = self.apply_raster(raster, panel_size);
                    // Re-issue the next cycle while capture stays armed.
                    self.maybe_issue_capture(panel_size);
                    event
                }
                error_state => {
                    self.store.cleanup(None);
                    match FetchErrorKind::from_state(error_state) {
                        Some(kind) => TickEvent::Error(kind),
                        None => TickEvent::None,
                    }
                }
            };
        }

        match self.cell.state() {
            AcquisitionState::Idle => {
                // Follow panel resizes between cycles; the tracked-size
                // gate makes this free when nothing changed.
                self.canvas.refit(panel_size, false);
                TickEvent::None
            }
            AcquisitionState::FetchInFlight => {
                // Observe liveness only; the worker owns the transition.
                self.canvas.refit(panel_size, false);
                TickEvent::None
            }
            AcquisitionState::CaptureArmed => {
                self.canvas.refit(panel_size, false);
                self.maybe_issue_capture(panel_size);
                TickEvent::None
            }
            _ => TickEvent::None,
        }
    }

    /// Decode and composite a terminal raster, then release its transients.
    fn apply_raster(&mut self, raster: Option<RasterResource>, panel_size: (u32, u32)) -> TickEvent {
        let Some(raster) = raster else {
            return TickEvent::None;
        };
        let event = match image::open(&raster.path) {
            Ok(decoded) => {
                self.canvas.apply(decoded.to_rgba8(), panel_size);
                log::info!("[PANEL] image applied from {}", raster.path.display());
                TickEvent::ImageApplied
            }
            Err(e) => {
                log::error!("[PANEL] failed to decode {}: {}", raster.path.display(), e);
                TickEvent::None
            }
        };
        self.store.cleanup(Some(&raster.ext));
        event
    }

    /// Spawn the next capture cycle when capture is selected, no cycle is
    /// live, and the minimum interval has elapsed.
    fn maybe_issue_capture(&mut self, panel_size: (u32, u32)) {
        if !matches!(self.source, ImageSource::CaptureTarget(_)) {
            return;
        }
        if self.capture_worker.is_some() {
            return;
        }
        if let Some(last) = self.last_capture_issue {
            if last.elapsed() < self.capture_interval {
                return;
            }
        }
        if self.cell.state() != AcquisitionState::CaptureArmed {
            return;
        }

        let generation = self.cell.begin_capture_cycle();
        let backend = Arc::clone(&self.backend);
        let session = Arc::clone(&self.session);
        let store = self.store.clone();
        let cell = Arc::clone(&self.cell);
        let margin = self.oscillator.value();
        self.capture_worker = Some(std::thread::spawn(move || {
            capture::run_capture_cycle(
                backend, session, panel_size, margin, store, cell, generation,
            );
        }));
        self.last_capture_issue = Some(Instant::now());
    }

    /// Release the capture session when an apply-style request moves the
    /// selection off a capture target.
    fn leave_capture(&mut self) {
        if matches!(self.source, ImageSource::CaptureTarget(_)) {
            self.session
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        }
    }

    /// Reject requests while a fetch cycle is in flight or its terminal
    /// value has not been consumed yet.
    fn ensure_not_busy(&self) -> Result<(), RequestError> {
        let state = self.cell.state();
        if state == AcquisitionState::FetchInFlight
            || (state.is_terminal() && state != AcquisitionState::CaptureDone)
        {
            return Err(RequestError::Busy);
        }
        Ok(())
    }

    fn reap_workers(&mut self) {
        if self.fetch_worker.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.fetch_worker.take() {
                let _ = handle.join();
            }
        }
        if self.capture_worker.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.capture_worker.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for StatusDriver {
    fn drop(&mut self) {
        // Supersede any in-flight cycle so late writes are discarded, then
        // wait the workers out; they never block indefinitely.
        self.cell.reset();
        if let Some(handle) = self.fetch_worker.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.capture_worker.take() {
            let _ = handle.join();
        }
    }
}
