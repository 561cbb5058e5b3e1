//! Image sources — where the panel's picture comes from.
//!
//! Each source variant carries its own behavior: endpoints know their URL
//! and how to pull an image link out of their particular JSON shape, and
//! every source declares which panel controls are active while it is
//! selected. Selection is read-only to the core once a cycle starts.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// A static image API endpoint with a known response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// dog.ceo random-breed API — `{"message": "<url>", "status": "success"}`.
    DogRandom,
    /// shibe.online API — a bare JSON array of image URLs.
    ShibaInu,
    /// Frinkiac random-screenshot API — nested `Frame` object interpolated
    /// into the image CDN URL template.
    Frinkiac,
}

impl Endpoint {
    /// All endpoints, in the order the host should list them.
    pub const ALL: [Endpoint; 3] = [Endpoint::DogRandom, Endpoint::ShibaInu, Endpoint::Frinkiac];

    /// Display label for the host's preset picker.
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::DogRandom => "API: Dog (Random Breed)",
            Endpoint::ShibaInu => "API: Dog (Shiba Inu)",
            Endpoint::Frinkiac => "API: Frinkiac (Simpsons Screenshots)",
        }
    }

    /// The API URL queried for this endpoint.
    pub fn url(&self) -> &'static str {
        match self {
            Endpoint::DogRandom => "https://dog.ceo/api/breeds/image/random",
            Endpoint::ShibaInu => "http://shibe.online/api/shibes?count=1&urls=true",
            Endpoint::Frinkiac => "https://frinkiac.com/api/random",
        }
    }

    /// Extract the image URL from this endpoint's JSON response.
    ///
    /// Returns `None` when the payload does not have the expected shape —
    /// the caller surfaces that as a URL-extraction failure.
    pub fn extract_image_url(&self, payload: &Value) -> Option<String> {
        match self {
            Endpoint::DogRandom => payload.get("message")?.as_str().map(str::to_owned),
            Endpoint::ShibaInu => payload.as_array()?.first()?.as_str().map(str::to_owned),
            Endpoint::Frinkiac => {
                let frame = payload.get("Frame")?;
                let episode = field_text(frame.get("Episode")?)?;
                let timestamp = field_text(frame.get("Timestamp")?)?;
                Some(format!("https://frinkiac.com/img/{}/{}.jpg", episode, timestamp))
            }
        }
    }
}

/// Render a JSON scalar as URL-path text. Frinkiac serves `Timestamp` as a
/// number and `Episode` as a string; both interpolate into the template.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Where the next image comes from. Selected by the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// A known API endpoint; the fetch worker resolves the image URL from
    /// its JSON response.
    StaticEndpoint(Endpoint),
    /// A user-entered image URL. May be empty, which is a user error at
    /// fetch time rather than selection time.
    CustomUrl(String),
    /// An image file already on disk, chosen through the host's file picker.
    LocalFile(PathBuf),
    /// A raster pasted from the clipboard, persisted to a transient file.
    ClipboardPaste(PathBuf),
    /// Live periodic snapshots of the window owned by this process id.
    CaptureTarget(u32),
}

impl ImageSource {
    /// Which panel controls are active while this source is selected.
    pub fn policy(&self) -> SourcePolicy {
        match self {
            ImageSource::StaticEndpoint(_) => SourcePolicy {
                url_entry_enabled: false,
                fetch_enabled: true,
                load_enabled: false,
                window_picker_visible: false,
            },
            ImageSource::CustomUrl(_) | ImageSource::LocalFile(_) | ImageSource::ClipboardPaste(_) => {
                SourcePolicy {
                    url_entry_enabled: true,
                    fetch_enabled: true,
                    load_enabled: true,
                    window_picker_visible: false,
                }
            }
            ImageSource::CaptureTarget(_) => SourcePolicy {
                url_entry_enabled: false,
                fetch_enabled: false,
                load_enabled: false,
                window_picker_visible: true,
            },
        }
    }
}

/// Enablement flags for the host's panel widgets, derived from the selected
/// source instead of branching on a display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcePolicy {
    pub url_entry_enabled: bool,
    pub fetch_enabled: bool,
    pub load_enabled: bool,
    pub window_picker_visible: bool,
}
