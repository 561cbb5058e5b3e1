//! Aspect-fit compositor — letterbox/pillarbox a source raster into a
//! fixed-size canvas.
//!
//! The fit itself is pure integer math; `DisplayCanvas` wraps it with the
//! tracked-size gate so a tick with an unchanged panel size recomposites
//! nothing.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Canvas fill behind the fitted image.
pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Placement of a source raster inside a canvas, aspect ratio preserved,
/// centered on the shorter axis.
///
/// Compares `src_w * canvas_h` against `canvas_w * src_h`: when the former
/// is greater the source is relatively wider, so it spans the full canvas
/// width and gets letterbox bars top and bottom; otherwise it spans the full
/// height with pillarbox bars left and right.
pub fn fit_rect(src_w: u32, src_h: u32, canvas_w: u32, canvas_h: u32) -> (u32, u32, u32, u32) {
    if src_w == 0 || src_h == 0 || canvas_w == 0 || canvas_h == 0 {
        return (0, 0, canvas_w, canvas_h);
    }
    if (src_w as u64) * (canvas_h as u64) > (canvas_w as u64) * (src_h as u64) {
        let w = canvas_w;
        let h = (((canvas_w as u64) * (src_h as u64)) / (src_w as u64)).max(1) as u32;
        (0, (canvas_h - h.min(canvas_h)) / 2, w, h)
    } else {
        let h = canvas_h;
        let w = (((canvas_h as u64) * (src_w as u64)) / (src_h as u64)).max(1) as u32;
        ((canvas_w - w.min(canvas_w)) / 2, 0, w, h)
    }
}

/// Composite `source` into a fresh canvas of the given size.
pub fn fit(source: &RgbaImage, canvas_w: u32, canvas_h: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(canvas_w.max(1), canvas_h.max(1), BACKGROUND);
    let (x, y, w, h) = fit_rect(source.width(), source.height(), canvas_w, canvas_h);
    if w == 0 || h == 0 {
        return canvas;
    }
    let scaled = imageops::resize(source, w, h, FilterType::Triangle);
    imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
    canvas
}

/// The panel's display surface. Keeps the last applied source raster so a
/// panel resize can recomposite without re-decoding, and the size it was
/// last rendered at so unchanged ticks skip the work.
pub struct DisplayCanvas {
    source: Option<RgbaImage>,
    surface: RgbaImage,
    rendered_size: (u32, u32),
}

impl DisplayCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            source: None,
            surface: RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND),
            rendered_size: (width, height),
        }
    }

    /// Apply a newly acquired raster, recompositing unconditionally.
    pub fn apply(&mut self, source: RgbaImage, size: (u32, u32)) {
        self.source = Some(source);
        self.refit(size, true);
    }

    /// Recomposite if the panel size changed since the last render, or when
    /// forced. Returns whether the surface was redrawn.
    pub fn refit(&mut self, size: (u32, u32), force: bool) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        if !force && size == self.rendered_size {
            return false;
        }
        self.surface = fit(source, size.0, size.1);
        self.rendered_size = size;
        true
    }

    /// The composited surface the host blits to screen.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn rendered_size(&self) -> (u32, u32) {
        self.rendered_size
    }

    pub fn has_image(&self) -> bool {
        self.source.is_some()
    }
}
