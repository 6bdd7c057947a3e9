// ============================================================================
// MASK CANVAS — surface raster, brush compositing, coordinate mapping, export
// ============================================================================
//
// The mask surface is a plain RGBA8 raster sized to the *on-screen* draw
// rectangle of the loaded photo (view space, not source-image space). Painted
// pixels are opaque white; everything else is fully transparent. The exported
// PNG therefore doubles as the alpha map the inpainting service expects.

use egui::{Pos2, Rect};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};

/// Painted mask pixels are opaque white; alpha is the channel of interest.
pub const MASK_PAINT: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Unpainted / erased pixels.
pub const MASK_CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised by the mask engine. Decode and encode failures are local to
/// the operation that caused them and never invalidate the session.
#[derive(Debug)]
pub enum MaskError {
    /// Source image bytes could not be decoded as a supported raster format.
    Decode(String),
    /// The surface could not be serialized (only possible with no image loaded).
    Encode(String),
    /// An operation was attempted in a state that cannot service it.
    InvalidState(String),
}

impl std::fmt::Display for MaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaskError::Decode(e) => write!(f, "Image decode failed: {}", e),
            MaskError::Encode(e) => write!(f, "Mask encode failed: {}", e),
            MaskError::InvalidState(e) => write!(f, "Invalid mask state: {}", e),
        }
    }
}

impl std::error::Error for MaskError {}

// ============================================================================
// BRUSH
// ============================================================================

/// Compositing rule applied while painting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrushMode {
    /// Source-over with an opaque white source: marks the area for inpainting.
    Draw,
    /// Destination-clear: removes alpha regardless of prior content.
    Erase,
}

impl BrushMode {
    pub fn label(&self) -> &'static str {
        match self {
            BrushMode::Draw => "Draw",
            BrushMode::Erase => "Erase",
        }
    }
}

/// Brush configuration. Mutable at any time; read fresh on every stroke
/// segment, so changes apply immediately, including mid-stroke.
#[derive(Clone, Copy, Debug)]
pub struct Brush {
    pub radius: f32,
    pub mode: BrushMode,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            radius: 20.0,
            mode: BrushMode::Draw,
        }
    }
}

// ============================================================================
// COORDINATE MAPPING
// ============================================================================

/// A point in surface-local pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskPoint {
    pub x: f32,
    pub y: f32,
}

impl MaskPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Map a screen-space pointer position into surface-local coordinates by
    /// subtracting the surface's on-screen origin. egui delivers mouse and
    /// touch through the same pointer stream, so this covers both devices.
    pub fn from_screen(pointer: Pos2, surface_rect: Rect) -> Self {
        Self {
            x: pointer.x - surface_rect.min.x,
            y: pointer.y - surface_rect.min.y,
        }
    }
}

/// Letterboxed/pillarboxed draw rectangle for a source image inside fixed
/// on-screen bounds. `w`/`h` become the mask surface's working dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitRect {
    /// Offset of the draw rect inside the bounds (centers the shorter axis).
    pub x: f32,
    pub y: f32,
    pub w: u32,
    pub h: u32,
}

/// Compute the aspect-preserving draw rectangle for an `image_w`x`image_h`
/// source inside `max_w`x`max_h` bounds.
pub fn fit_rect(image_w: u32, image_h: u32, max_w: f32, max_h: f32) -> FitRect {
    let iw = image_w.max(1) as f32;
    let ih = image_h.max(1) as f32;
    let scale = (max_w / iw).min(max_h / ih);
    let w = (iw * scale).round().max(1.0);
    let h = (ih * scale).round().max(1.0);
    FitRect {
        x: ((max_w - w) / 2.0).max(0.0),
        y: ((max_h - h) / 2.0).max(0.0),
        w: w as u32,
        h: h as u32,
    }
}

/// Decode arbitrary source-image bytes to RGBA.
pub fn decode_source_image(bytes: &[u8]) -> Result<RgbaImage, MaskError> {
    let img = image::load_from_memory(bytes).map_err(|e| MaskError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

// ============================================================================
// MASK SURFACE
// ============================================================================

/// The in-memory pixel raster being painted on. Exclusively owned by one
/// mask session; reallocated whenever a new source image is loaded.
#[derive(Clone)]
pub struct MaskSurface {
    pixels: RgbaImage,
}

impl MaskSurface {
    /// Zero-sized surface used before any image is loaded. Encoding it fails.
    pub fn empty() -> Self {
        Self {
            pixels: RgbaImage::new(0, 0),
        }
    }

    /// Fresh fully-transparent surface at the given view-space dimensions.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, MASK_CLEAR),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Raw RGBA bytes, row-major. Used for history snapshots and textures.
    pub fn raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Overwrite the surface content from a history snapshot. Snapshots are
    /// only ever restored into the surface they were taken from, but the
    /// dimension check keeps a stale restore from slicing out of bounds.
    pub fn restore_raw(&mut self, width: u32, height: u32, data: &[u8]) {
        if width != self.width() || height != self.height() {
            self.pixels = RgbaImage::from_pixel(width, height, MASK_CLEAR);
        }
        self.pixels.copy_from_slice(data);
    }

    /// Reset every pixel to fully transparent.
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = MASK_CLEAR;
        }
    }

    /// True when no pixel carries alpha — "mask not drawn" and "mask erased
    /// back to empty" are deliberately indistinguishable for submission.
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|px| px.0[3] == 0)
    }

    #[inline]
    fn composite(&mut self, x: u32, y: u32, mode: BrushMode) {
        let px = self.pixels.get_pixel_mut(x, y);
        *px = match mode {
            BrushMode::Draw => MASK_PAINT,
            BrushMode::Erase => MASK_CLEAR,
        };
    }

    /// Rasterize a filled circle (a stationary brush press).
    pub fn draw_dab(&mut self, center: MaskPoint, radius: f32, mode: BrushMode) {
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return;
        }
        let r = radius.max(0.5);
        let r_sq = r * r;
        let min_x = (center.x - r).floor().max(0.0) as u32;
        let max_x = ((center.x + r).ceil().max(0.0) as u32).min(w.saturating_sub(1));
        let min_y = (center.y - r).floor().max(0.0) as u32;
        let max_y = ((center.y + r).ceil().max(0.0) as u32).min(h.saturating_sub(1));
        if min_x > max_x || min_y > max_y {
            return;
        }

        for y in min_y..=max_y {
            let dy = y as f32 - center.y;
            let dy_sq = dy * dy;
            for x in min_x..=max_x {
                let dx = x as f32 - center.x;
                if dx * dx + dy_sq <= r_sq {
                    self.composite(x, y, mode);
                }
            }
        }
    }

    /// Rasterize a capsule (round-cap, round-join line segment) of the given
    /// width. Connecting consecutive pointer samples with capsules — rather
    /// than dotting dabs — keeps a fast gesture gap-free at any sampling rate.
    pub fn draw_stroke(&mut self, from: MaskPoint, to: MaskPoint, width: f32, mode: BrushMode) {
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return;
        }
        let r = (width / 2.0).max(0.5);
        let r_sq = r * r;

        let seg_x = to.x - from.x;
        let seg_y = to.y - from.y;
        let seg_len_sq = seg_x * seg_x + seg_y * seg_y;
        if seg_len_sq < f32::EPSILON {
            self.draw_dab(from, r, mode);
            return;
        }

        let min_x = (from.x.min(to.x) - r).floor().max(0.0) as u32;
        let max_x = ((from.x.max(to.x) + r).ceil().max(0.0) as u32).min(w.saturating_sub(1));
        let min_y = (from.y.min(to.y) - r).floor().max(0.0) as u32;
        let max_y = ((from.y.max(to.y) + r).ceil().max(0.0) as u32).min(h.saturating_sub(1));
        if min_x > max_x || min_y > max_y {
            return;
        }

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                // Distance from the pixel to the segment, via the clamped
                // projection onto it.
                let px = x as f32 - from.x;
                let py = y as f32 - from.y;
                let t = ((px * seg_x + py * seg_y) / seg_len_sq).clamp(0.0, 1.0);
                let dx = px - t * seg_x;
                let dy = py - t * seg_y;
                if dx * dx + dy * dy <= r_sq {
                    self.composite(x, y, mode);
                }
            }
        }
    }

    /// Serialize the surface to a lossless RGBA PNG. The format is exact by
    /// construction, so the service receives the pixel values as painted.
    pub fn encode_png(&self) -> Result<Vec<u8>, MaskError> {
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return Err(MaskError::Encode("no image loaded".to_string()));
        }
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(self.pixels.as_raw(), w, h, ColorType::Rgba8)
            .map_err(|e| MaskError::Encode(e.to_string()))?;
        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha(surface: &MaskSurface, x: u32, y: u32) -> u8 {
        surface.pixels().get_pixel(x, y).0[3]
    }

    #[test]
    fn draw_dab_paints_opaque_white() {
        let mut s = MaskSurface::blank(100, 100);
        s.draw_dab(MaskPoint::new(50.0, 50.0), 10.0, BrushMode::Draw);
        assert_eq!(*s.pixels().get_pixel(50, 50), MASK_PAINT);
        assert_eq!(alpha(&s, 0, 0), 0);
    }

    #[test]
    fn erase_is_idempotent() {
        let mut s = MaskSurface::blank(64, 64);
        s.draw_dab(MaskPoint::new(32.0, 32.0), 12.0, BrushMode::Draw);
        s.draw_dab(MaskPoint::new(32.0, 32.0), 6.0, BrushMode::Erase);
        let once = s.clone();
        s.draw_dab(MaskPoint::new(32.0, 32.0), 6.0, BrushMode::Erase);
        assert_eq!(once.raw(), s.raw());
    }

    #[test]
    fn erase_inverts_draw_on_fresh_surface() {
        let mut s = MaskSurface::blank(64, 64);
        s.draw_dab(MaskPoint::new(20.0, 20.0), 8.0, BrushMode::Draw);
        assert!(!s.is_blank());
        s.draw_dab(MaskPoint::new(20.0, 20.0), 8.0, BrushMode::Erase);
        assert!(s.is_blank());
    }

    #[test]
    fn erase_clears_regardless_of_draw_order() {
        let mut s = MaskSurface::blank(64, 64);
        s.draw_stroke(
            MaskPoint::new(5.0, 30.0),
            MaskPoint::new(60.0, 30.0),
            10.0,
            BrushMode::Draw,
        );
        s.draw_stroke(
            MaskPoint::new(60.0, 30.0),
            MaskPoint::new(5.0, 30.0),
            10.0,
            BrushMode::Erase,
        );
        assert!(s.is_blank());
    }

    #[test]
    fn stroke_has_no_gaps_between_samples() {
        // Scan a straight line between the endpoints: every sample must lie
        // within the brush half-width of a painted pixel.
        let mut s = MaskSurface::blank(200, 200);
        let a = MaskPoint::new(10.0, 15.0);
        let b = MaskPoint::new(180.0, 170.0);
        let width = 8.0;
        s.draw_stroke(a, b, width, BrushMode::Draw);

        for step in 0..=100 {
            let t = step as f32 / 100.0;
            let sx = a.x + (b.x - a.x) * t;
            let sy = a.y + (b.y - a.y) * t;
            let r = width / 2.0;
            let mut covered = false;
            'scan: for y in (sy - r).floor() as i32..=(sy + r).ceil() as i32 {
                for x in (sx - r).floor() as i32..=(sx + r).ceil() as i32 {
                    if x < 0 || y < 0 || x >= 200 || y >= 200 {
                        continue;
                    }
                    let dx = x as f32 - sx;
                    let dy = y as f32 - sy;
                    if dx * dx + dy * dy <= r * r && alpha(&s, x as u32, y as u32) == 255 {
                        covered = true;
                        break 'scan;
                    }
                }
            }
            assert!(covered, "gap at t={}", t);
        }
    }

    #[test]
    fn zero_length_stroke_degenerates_to_dab() {
        let mut a = MaskSurface::blank(40, 40);
        let mut b = MaskSurface::blank(40, 40);
        let p = MaskPoint::new(20.0, 20.0);
        a.draw_stroke(p, p, 10.0, BrushMode::Draw);
        b.draw_dab(p, 5.0, BrushMode::Draw);
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn dab_clips_at_surface_edges() {
        let mut s = MaskSurface::blank(30, 30);
        s.draw_dab(MaskPoint::new(0.0, 0.0), 10.0, BrushMode::Draw);
        s.draw_dab(MaskPoint::new(29.0, 29.0), 10.0, BrushMode::Draw);
        assert_eq!(alpha(&s, 0, 0), 255);
        assert_eq!(alpha(&s, 29, 29), 255);
    }

    #[test]
    fn encode_round_trips_exactly() {
        let mut s = MaskSurface::blank(100, 100);
        s.draw_dab(MaskPoint::new(50.0, 50.0), 10.0, BrushMode::Draw);
        let bytes = s.encode_png().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (100, 100));
        assert_eq!(decoded.get_pixel(50, 50).0[3], 255);
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn encode_fails_with_no_surface() {
        let s = MaskSurface::empty();
        assert!(matches!(s.encode_png(), Err(MaskError::Encode(_))));
    }

    #[test]
    fn fit_rect_pillarboxes_tall_images() {
        let r = fit_rect(100, 200, 800.0, 600.0);
        assert_eq!(r.h, 600);
        assert_eq!(r.w, 300);
        assert_eq!(r.y, 0.0);
        assert_eq!(r.x, 250.0);
    }

    #[test]
    fn fit_rect_letterboxes_wide_images() {
        let r = fit_rect(400, 100, 800.0, 600.0);
        assert_eq!(r.w, 800);
        assert_eq!(r.h, 200);
        assert_eq!(r.x, 0.0);
        assert_eq!(r.y, 200.0);
    }

    #[test]
    fn screen_mapping_subtracts_surface_origin() {
        let rect = Rect::from_min_size(Pos2::new(120.0, 40.0), egui::vec2(640.0, 480.0));
        let p = MaskPoint::from_screen(Pos2::new(170.0, 95.0), rect);
        assert_eq!(p, MaskPoint::new(50.0, 55.0));
    }

    #[test]
    fn decode_rejects_corrupt_bytes() {
        assert!(matches!(
            decode_source_image(b"definitely not an image"),
            Err(MaskError::Decode(_))
        ));
    }
}
