//! End-to-end acquisition scenarios, driven the way the host would: select a
//! source, forward an event, tick every few milliseconds, watch the canvas.
//!
//! Network and OS capture are replaced by injected primitives so the
//! state-machine behavior is what's under test.

use image::{Rgba, RgbaImage};
use reference_image::capture::{CaptureHandle, WindowBackend};
use reference_image::driver::{RequestError, StatusDriver, TickEvent};
use reference_image::fetch::{FetchErrorKind, FetchPrimitiveError, Fetcher};
use reference_image::source::{Endpoint, ImageSource};
use reference_image::state::AcquisitionState;
use reference_image::store::ResourceStore;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn temp_store(tag: &str) -> ResourceStore {
    let dir = std::env::temp_dir().join(format!("ref-image-flow-{}", tag));
    let _ = std::fs::remove_dir_all(&dir);
    ResourceStore::new(dir).unwrap()
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 60, 30, 255]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Fetcher that pops canned responses, recording every requested URL.
/// A `Delay` step keeps the worker in flight long enough to observe.
enum Step {
    Respond(Vec<u8>),
    Fail,
    DelayThenRespond(Duration, Vec<u8>),
}

struct ScriptedFetcher {
    script: Mutex<Vec<Step>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<(), FetchPrimitiveError> {
        self.requests.lock().unwrap().push(url.to_string());
        let step = self.script.lock().unwrap().remove(0);
        match step {
            Step::Respond(bytes) => {
                std::fs::write(dest, bytes).unwrap();
                Ok(())
            }
            Step::Fail => Err(FetchPrimitiveError::NoOutput),
            Step::DelayThenRespond(delay, bytes) => {
                std::thread::sleep(delay);
                std::fs::write(dest, bytes).unwrap();
                Ok(())
            }
        }
    }
}

/// Backend with a mutable pid -> window-size table and a release counter.
struct FakeWindows {
    windows: Mutex<HashMap<u32, (u32, u32)>>,
    releases: AtomicU32,
}

impl FakeWindows {
    fn new(windows: &[(u32, (u32, u32))]) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(windows.iter().copied().collect()),
            releases: AtomicU32::new(0),
        })
    }

    fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

impl WindowBackend for FakeWindows {
    fn resolve(&self, pid: u32) -> Option<CaptureHandle> {
        self.windows
            .lock()
            .unwrap()
            .contains_key(&pid)
            .then_some(CaptureHandle { window_id: 9000 + pid, pid })
    }

    fn client_size(&self, handle: CaptureHandle) -> Option<(u32, u32)> {
        self.windows.lock().unwrap().get(&handle.pid).copied()
    }

    fn grab(&self, handle: CaptureHandle) -> Option<RgbaImage> {
        let (w, h) = self.client_size(handle)?;
        Some(RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255])))
    }

    fn release(&self, _handle: CaptureHandle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn make_driver(
    store: &ResourceStore,
    fetcher: Arc<dyn Fetcher>,
    backend: Arc<dyn WindowBackend>,
) -> StatusDriver {
    StatusDriver::new(
        store.clone(),
        fetcher,
        backend,
        (-5, 5),
        Duration::from_millis(1),
        (1, 1),
    )
}

/// Tick until the predicate accepts an event or the timeout expires.
fn drive_until(
    driver: &mut StatusDriver,
    size: (u32, u32),
    mut accept: impl FnMut(TickEvent) -> bool,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if accept(driver.tick(size)) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn scenario_a_endpoint_fetch_applies_image() {
    init_logging();
    let store = temp_store("scenario-a");
    let fetcher = ScriptedFetcher::new(vec![
        // Slow enough that the in-flight state is observable from the test.
        Step::DelayThenRespond(
            Duration::from_millis(100),
            br#"{"message": "https://a/b.png"}"#.to_vec(),
        ),
        Step::Respond(png_bytes(64, 32)),
    ]);
    let backend = FakeWindows::new(&[]);
    let mut driver = make_driver(&store, fetcher.clone(), backend);

    driver.select_source(ImageSource::StaticEndpoint(Endpoint::DogRandom));
    assert_eq!(driver.acquisition_state(), AcquisitionState::Idle);

    driver.request_fetch().unwrap();
    // The cycle is in flight until the worker's terminal write.
    assert_eq!(driver.acquisition_state(), AcquisitionState::FetchInFlight);

    let applied = drive_until(
        &mut driver,
        (100, 100),
        |event| event == TickEvent::ImageApplied,
        Duration::from_secs(5),
    );
    assert!(applied, "fetch never completed");

    // Idle -> FetchInFlight -> ImageReady -> Idle: the terminal value was
    // consumed and the cycle reset.
    assert_eq!(driver.acquisition_state(), AcquisitionState::Idle);
    assert!(driver.canvas().has_image());
    assert_eq!(driver.canvas().surface().dimensions(), (100, 100));

    // Both the API response and the downloaded image were cleaned up.
    assert!(!store.api_response_path().exists());
    assert!(!store.downloaded_image_path("png").exists());
    assert_eq!(
        fetcher.requests(),
        vec![
            "https://dog.ceo/api/breeds/image/random".to_string(),
            "https://a/b.png".to_string(),
        ]
    );
    let _ = std::fs::remove_dir_all(store.dir());
}

#[test]
fn scenario_b_blank_custom_url_reports_without_network() {
    init_logging();
    let store = temp_store("scenario-b");
    let fetcher = ScriptedFetcher::new(vec![]);
    let backend = FakeWindows::new(&[]);
    let mut driver = make_driver(&store, fetcher.clone(), backend);

    driver.select_source(ImageSource::CustomUrl(String::new()));
    driver.request_fetch().unwrap();

    let mut surfaced = None;
    let errored = drive_until(
        &mut driver,
        (100, 100),
        |event| {
            if let TickEvent::Error(kind) = event {
                surfaced = Some(kind);
                true
            } else {
                false
            }
        },
        Duration::from_secs(5),
    );
    assert!(errored, "error never surfaced");
    assert_eq!(surfaced, Some(FetchErrorKind::NoUrl));
    assert_eq!(
        surfaced.unwrap().to_string(),
        "Please enter an image URL."
    );

    // No network call was attempted and the panel is usable again.
    assert!(fetcher.requests().is_empty());
    assert_eq!(driver.acquisition_state(), AcquisitionState::Idle);
    assert!(!driver.canvas().has_image());
    let _ = std::fs::remove_dir_all(store.dir());
}

#[test]
fn fetch_while_in_flight_is_rejected() {
    init_logging();
    let store = temp_store("busy");
    let fetcher = ScriptedFetcher::new(vec![Step::DelayThenRespond(
        Duration::from_millis(200),
        png_bytes(8, 8),
    )]);
    let backend = FakeWindows::new(&[]);
    let mut driver = make_driver(&store, fetcher.clone(), backend);

    driver.select_source(ImageSource::CustomUrl("https://a/slow.png".into()));
    driver.request_fetch().unwrap();
    assert_eq!(driver.acquisition_state(), AcquisitionState::FetchInFlight);

    // A second request must be rejected and leave the cycle untouched.
    let err = driver.request_fetch().unwrap_err();
    assert!(matches!(err, RequestError::Busy));
    assert_eq!(
        err.to_string(),
        "Please wait for the current image to load."
    );
    assert_eq!(driver.acquisition_state(), AcquisitionState::FetchInFlight);

    // Let the in-flight cycle finish normally.
    let applied = drive_until(
        &mut driver,
        (100, 100),
        |event| event == TickEvent::ImageApplied,
        Duration::from_secs(5),
    );
    assert!(applied);
    assert_eq!(fetcher.requests().len(), 1);
    let _ = std::fs::remove_dir_all(store.dir());
}

#[test]
fn scenario_c_capture_cycles_and_target_switch() {
    init_logging();
    let store = temp_store("scenario-c");
    let fetcher = ScriptedFetcher::new(vec![]);
    let backend = FakeWindows::new(&[(10, (200, 100)), (20, (100, 200))]);
    let mut driver = make_driver(&store, fetcher, backend.clone());

    driver.select_source(ImageSource::CaptureTarget(10));
    assert_eq!(driver.acquisition_state(), AcquisitionState::CaptureArmed);

    // Repeating CaptureArmed -> CaptureDone -> CaptureArmed cycles: the
    // canvas updates on each completed cycle.
    let mut applies = 0;
    let cycled = drive_until(
        &mut driver,
        (100, 100),
        |event| {
            if event == TickEvent::ImageApplied {
                applies += 1;
            }
            applies >= 3
        },
        Duration::from_secs(10),
    );
    assert!(cycled, "capture cycles never repeated");
    assert!(driver.canvas().has_image());
    assert_eq!(driver.acquisition_state(), AcquisitionState::CaptureArmed);
    assert_eq!(backend.releases(), 0);

    // Switching the target pid releases the prior handle exactly once and
    // resolves the new window on a later cycle.
    driver.select_source(ImageSource::CaptureTarget(20));
    assert_eq!(backend.releases(), 1);

    let mut applies_after_switch = 0;
    let cycled = drive_until(
        &mut driver,
        (100, 100),
        |event| {
            if event == TickEvent::ImageApplied {
                applies_after_switch += 1;
            }
            applies_after_switch >= 2
        },
        Duration::from_secs(10),
    );
    assert!(cycled, "capture never resumed after target switch");
    assert_eq!(backend.releases(), 1);

    // Deselecting capture releases the current handle and idles the panel.
    driver.select_source(ImageSource::CustomUrl(String::new()));
    assert_eq!(backend.releases(), 2);
    assert_eq!(driver.acquisition_state(), AcquisitionState::Idle);
    let _ = std::fs::remove_dir_all(store.dir());
}

#[test]
fn local_file_applies_without_workers() {
    init_logging();
    let store = temp_store("local-file");
    let fetcher = ScriptedFetcher::new(vec![]);
    let backend = FakeWindows::new(&[]);
    let mut driver = make_driver(&store, fetcher.clone(), backend);

    let user_file = std::env::temp_dir().join("ref-image-flow-user.png");
    std::fs::write(&user_file, png_bytes(20, 20)).unwrap();

    driver.load_file(user_file.clone()).unwrap();
    assert_eq!(driver.acquisition_state(), AcquisitionState::ImageReady);

    let event = driver.tick((50, 50));
    assert_eq!(event, TickEvent::ImageApplied);
    assert_eq!(driver.acquisition_state(), AcquisitionState::Idle);
    assert!(fetcher.requests().is_empty());

    // The user's file survives transient cleanup.
    assert!(user_file.exists());
    let _ = std::fs::remove_file(&user_file);
    let _ = std::fs::remove_dir_all(store.dir());
}

#[test]
fn idle_resize_recomposites_canvas() {
    init_logging();
    let store = temp_store("idle-resize");
    let fetcher = ScriptedFetcher::new(vec![]);
    let backend = FakeWindows::new(&[]);
    let mut driver = make_driver(&store, fetcher, backend);

    let user_file = std::env::temp_dir().join("ref-image-flow-resize.png");
    std::fs::write(&user_file, png_bytes(40, 20)).unwrap();
    driver.load_file(user_file.clone()).unwrap();
    assert_eq!(driver.tick((100, 100)), TickEvent::ImageApplied);
    assert_eq!(driver.canvas().surface().dimensions(), (100, 100));
    assert_eq!(driver.acquisition_state(), AcquisitionState::Idle);

    // Resizing the panel while idle recomposites the kept source onto a
    // surface of the new dimensions.
    for _ in 0..5 {
        assert_eq!(driver.tick((200, 150)), TickEvent::None);
    }
    assert_eq!(driver.canvas().surface().dimensions(), (200, 150));

    // An unchanged size keeps the surface as-is.
    driver.tick((200, 150));
    assert_eq!(driver.canvas().surface().dimensions(), (200, 150));

    let _ = std::fs::remove_file(&user_file);
    let _ = std::fs::remove_dir_all(store.dir());
}
