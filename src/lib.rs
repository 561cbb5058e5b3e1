//! Reference Image — panel core.
//!
//! The asynchronous acquisition and display state machine behind a
//! single-image panel embedded in a host application. The host owns the
//! widgets; this crate owns everything with real coordination in it:
//!
//!   - driver.rs     — tick-polled status dispatcher (the only state consumer)
//!   - fetch.rs      — background URL/endpoint fetch worker
//!   - capture.rs    — background periodic window-capture worker
//!   - compositor.rs — aspect-fit letterbox/pillarbox compositing
//!   - store.rs      — transient file lifecycle
//!   - source.rs     — image source variants + endpoint extractors
//!   - state.rs      — generation-fenced shared acquisition state
//!   - panel.rs      — host lifecycle: config, registry, create/destroy
//!
//! The host calls `PanelRegistry::create`, forwards UI events
//! (`select_source`, `request_fetch`, `load_file`, `paste_clipboard`), ticks
//! the driver every frame, and blits `DisplayCanvas::surface`.

pub mod capture;
pub mod clipboard;
pub mod compositor;
pub mod driver;
pub mod fetch;
pub mod panel;
pub mod source;
pub mod state;
pub mod store;

pub use compositor::DisplayCanvas;
pub use driver::{StatusDriver, TickEvent};
pub use panel::{Panel, PanelConfig, PanelError, PanelRegistry};
pub use source::{Endpoint, ImageSource};
pub use state::AcquisitionState;
