//! Capture worker — periodic snapshots of another application's window.
//!
//! OS access goes through the `WindowBackend` trait; the production
//! implementation uses the `xcap` crate. This is the infrastructure layer —
//! it talks to the OS. Tests inject a mock backend.
//!
//! A cycle that finds no window is a silent skip, not an error: the window
//! may appear later, and the previously displayed image stays in place.

use crate::compositor;
use crate::state::{AcquisitionState, RasterResource, StateCell};
use crate::store::ResourceStore;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::sync::{Arc, Mutex};

/// Resolved identity of the capture target's window. The original HWND +
/// device-context pair collapses to the OS window id here; per-cycle buffer
/// resources are dropped by RAII.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHandle {
    pub window_id: u32,
    pub pid: u32,
}

/// OS window enumeration and capture primitives.
pub trait WindowBackend: Send + Sync {
    /// First visible, non-minimized top-level window owned by `pid`.
    fn resolve(&self, pid: u32) -> Option<CaptureHandle>;

    /// Client-area size of the window, or `None` if it is gone.
    fn client_size(&self, handle: CaptureHandle) -> Option<(u32, u32)>;

    /// Grab the window's visible contents. `None` when the window vanished
    /// mid-cycle.
    fn grab(&self, handle: CaptureHandle) -> Option<RgbaImage>;

    /// Release any OS resources tied to the handle. The session guarantees
    /// this is called exactly once per resolved handle.
    fn release(&self, _handle: CaptureHandle) {}
}

/// Production backend on top of xcap's cross-platform window list.
pub struct XcapBackend;

impl XcapBackend {
    fn find_by_id(window_id: u32) -> Option<xcap::Window> {
        xcap::Window::all()
            .ok()?
            .into_iter()
            .find(|w| w.id().map(|id| id == window_id).unwrap_or(false))
    }
}

impl WindowBackend for XcapBackend {
    fn resolve(&self, pid: u32) -> Option<CaptureHandle> {
        let windows = match xcap::Window::all() {
            Ok(windows) => windows,
            Err(e) => {
                log::warn!("[CAPTURE] window enumeration failed: {}", e);
                return None;
            }
        };
        windows
            .into_iter()
            .filter(|w| !w.is_minimized().unwrap_or(true))
            .find(|w| w.pid().map(|p| p == pid).unwrap_or(false))
            .and_then(|w| {
                let window_id = w.id().ok()?;
                Some(CaptureHandle { window_id, pid })
            })
    }

    fn client_size(&self, handle: CaptureHandle) -> Option<(u32, u32)> {
        let window = Self::find_by_id(handle.window_id)?;
        let width = window.width().ok()?;
        let height = window.height().ok()?;
        Some((width, height))
    }

    fn grab(&self, handle: CaptureHandle) -> Option<RgbaImage> {
        let window = Self::find_by_id(handle.window_id)?;
        match window.capture_image() {
            Ok(image) => Some(image),
            Err(e) => {
                log::debug!("[CAPTURE] grab failed for window {}: {}", handle.window_id, e);
                None
            }
        }
    }
}

/// Long-lived handle cache for the capture target. Owned by the driver,
/// shared with the in-flight cycle; the handle persists across cycles until
/// the target pid changes or capture is deselected, and is released exactly
/// once when invalidated.
pub struct CaptureSession {
    backend: Arc<dyn WindowBackend>,
    target_pid: Option<u32>,
    handle: Option<CaptureHandle>,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn WindowBackend>) -> Self {
        Self {
            backend,
            target_pid: None,
            handle: None,
        }
    }

    pub fn target_pid(&self) -> Option<u32> {
        self.target_pid
    }

    /// Point the session at a process. A changed pid releases the prior
    /// handle before anything is re-resolved.
    pub fn set_target(&mut self, pid: u32) {
        if self.target_pid != Some(pid) {
            self.invalidate_handle();
            self.target_pid = Some(pid);
            log::info!("[CAPTURE] target set to pid {}", pid);
        }
    }

    /// Deselect capture entirely.
    pub fn clear(&mut self) {
        self.invalidate_handle();
        self.target_pid = None;
    }

    /// Drop the cached handle, releasing its OS resources once.
    pub fn invalidate_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("[CAPTURE] releasing handle for window {}", handle.window_id);
            self.backend.release(handle);
        }
    }

    /// Cached handle, resolving it if absent. `None` when the target has no
    /// resolvable window this cycle.
    pub fn ensure_handle(&mut self) -> Option<CaptureHandle> {
        if self.handle.is_none() {
            let pid = self.target_pid?;
            self.handle = self.backend.resolve(pid);
            if let Some(handle) = self.handle {
                log::debug!("[CAPTURE] resolved window {} for pid {}", handle.window_id, pid);
            }
        }
        self.handle
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.invalidate_handle();
    }
}

/// One capture cycle, run off the UI thread. Snapshots the target window
/// scaled to fit `dest` (with the oscillation `margin` added to both output
/// dimensions), saves it as the transient bitmap, and terminal-writes
/// `CaptureDone`. Leaves the state untouched when the window is missing so
/// the driver simply re-issues a later cycle.
pub fn run_capture_cycle(
    backend: Arc<dyn WindowBackend>,
    session: Arc<Mutex<CaptureSession>>,
    dest: (u32, u32),
    margin: i32,
    store: ResourceStore,
    cell: Arc<StateCell>,
    generation: u64,
) {
    // Resolve under the session lock, then drop it before the blocking
    // grab so the driver can invalidate the handle mid-cycle.
    let handle = {
        let mut session = session.lock().unwrap_or_else(|e| e.into_inner());
        match session.ensure_handle() {
            Some(handle) => handle,
            None => return,
        }
    };

    let Some((src_w, src_h)) = backend.client_size(handle) else {
        // Window gone; drop the cached handle so the next cycle re-resolves.
        session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate_handle();
        return;
    };
    if src_w == 0 || src_h == 0 {
        return;
    }

    let (_, _, fit_w, fit_h) = compositor::fit_rect(src_w, src_h, dest.0, dest.1);
    let out_w = (fit_w as i64 + margin as i64).max(1) as u32;
    let out_h = (fit_h as i64 + margin as i64).max(1) as u32;

    let Some(frame) = backend.grab(handle) else {
        session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate_handle();
        return;
    };

    let scaled = imageops::resize(&frame, fit_w, fit_h, FilterType::Triangle);
    let mut bitmap = RgbaImage::from_pixel(out_w, out_h, compositor::BACKGROUND);
    imageops::overlay(&mut bitmap, &scaled, 0, 0);

    let path = store.screenshot_path();
    // BMP is the transient format; RGB8 keeps the encoder happy.
    if let Err(e) = image::DynamicImage::ImageRgba8(bitmap).to_rgb8().save(&path) {
        log::warn!("[CAPTURE] failed to save {}: {}", path.display(), e);
        return;
    }

    log::debug!(
        "[CAPTURE] cycle complete: {}x{} -> {}x{} (margin {})",
        src_w, src_h, out_w, out_h, margin
    );
    cell.complete(
        generation,
        AcquisitionState::CaptureDone,
        Some(RasterResource::new(path, "bmp")),
    );
}
