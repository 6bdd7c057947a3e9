// ============================================================================
// MASK SESSION — stroke lifecycle, undo/redo history, change notification
// ============================================================================
//
// One session per loaded source image. The session owns the surface and the
// history exclusively; all state lives in fields here, constructed per image,
// with no ambient globals. Input events become explicit state-machine
// transitions: Idle ↔ Drawing, where Drawing is exactly `last_point.is_some()`.
//
// Everything runs synchronously inside the input-event handler that triggered
// it. The consumer treats mask-changed notifications as last-write-wins.

use image::RgbaImage;

use crate::canvas::{
    self, Brush, BrushMode, FitRect, MaskError, MaskPoint, MaskSurface,
};
use crate::components::history::MaskHistory;

/// Invoked with the encoded mask after every committed stroke, undo, redo,
/// or clear — `None` when no image is loaded or the mask is entirely empty.
pub type MaskListener = Box<dyn FnMut(Option<&[u8]>)>;

pub struct MaskSession {
    surface: MaskSurface,
    history: MaskHistory,
    brush: Brush,
    /// Some while a stroke gesture is active (the Drawing state).
    last_point: Option<MaskPoint>,
    /// Gates stroke transitions until a source image has loaded.
    image_ready: bool,
    /// Decoded source photo, kept for display and submission sizing.
    source: Option<RgbaImage>,
    /// On-screen draw rectangle of the source; the surface matches its size.
    fit: FitRect,
    /// Most recently encoded mask; None when blank or no image.
    current_mask: Option<Vec<u8>>,
    /// Bumped on every surface mutation so consumers can cheaply detect
    /// change (texture re-upload in the GUI).
    revision: u64,
    listener: Option<MaskListener>,
}

impl MaskSession {
    pub fn new() -> Self {
        Self {
            surface: MaskSurface::empty(),
            history: MaskHistory::seeded(&MaskSurface::empty()),
            brush: Brush::default(),
            last_point: None,
            image_ready: false,
            source: None,
            fit: FitRect {
                x: 0.0,
                y: 0.0,
                w: 0,
                h: 0,
            },
            current_mask: None,
            revision: 0,
            listener: None,
        }
    }

    /// Register the mask-changed consumer (the generate-button enablement
    /// and mask preview in the GUI).
    pub fn set_listener(&mut self, listener: MaskListener) {
        self.listener = Some(listener);
    }

    // ------------------------------------------------------------------
    // Image lifecycle
    // ------------------------------------------------------------------

    /// Load a new source image and start a fresh session over it. The surface
    /// is sized to the letterboxed on-screen rectangle within `max_w`x`max_h`
    /// (mask coordinates are view-space). Decode failure leaves the previous
    /// session fully intact.
    pub fn load_image(&mut self, bytes: &[u8], max_w: f32, max_h: f32) -> Result<FitRect, MaskError> {
        // Decode before touching any state, so a bad file cannot corrupt a
        // working session.
        let decoded = canvas::decode_source_image(bytes)?;
        let fit = canvas::fit_rect(decoded.width(), decoded.height(), max_w, max_h);

        // Brush settings deliberately survive across images.
        self.surface = MaskSurface::blank(fit.w, fit.h);
        self.history = MaskHistory::seeded(&self.surface);
        self.last_point = None;
        self.image_ready = true;
        self.source = Some(decoded);
        self.fit = fit;
        self.current_mask = None;
        self.revision += 1;
        self.notify();
        Ok(fit)
    }

    pub fn image_ready(&self) -> bool {
        self.image_ready
    }

    pub fn source_image(&self) -> Option<&RgbaImage> {
        self.source.as_ref()
    }

    pub fn fit(&self) -> FitRect {
        self.fit
    }

    pub fn surface(&self) -> &MaskSurface {
        &self.surface
    }

    /// Monotonic change counter over the surface content.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ------------------------------------------------------------------
    // Brush
    // ------------------------------------------------------------------

    /// Brush state is read fresh on every move event, so a change applies
    /// immediately — including to a stroke already being dragged.
    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn set_brush_radius(&mut self, radius: f32) {
        self.brush.radius = radius.max(1.0);
    }

    pub fn set_brush_mode(&mut self, mode: BrushMode) {
        self.brush.mode = mode;
    }

    // ------------------------------------------------------------------
    // Stroke state machine
    // ------------------------------------------------------------------

    pub fn is_drawing(&self) -> bool {
        self.last_point.is_some()
    }

    /// Pointer-down: paint a dab at the down position and enter Drawing.
    /// Ignored until an image is ready.
    pub fn stroke_begin(&mut self, p: MaskPoint) {
        if !self.image_ready {
            return;
        }
        self.surface.draw_dab(p, self.brush.radius, self.brush.mode);
        self.revision += 1;
        self.last_point = Some(p);
    }

    /// Pointer-move: connect the previous sample to this one with a capsule
    /// segment. Ignored entirely while Idle.
    pub fn stroke_move(&mut self, p: MaskPoint) {
        let Some(last) = self.last_point else {
            return;
        };
        self.surface
            .draw_stroke(last, p, self.brush.radius * 2.0, self.brush.mode);
        self.revision += 1;
        self.last_point = Some(p);
    }

    /// Pointer-up / pointer-leave: commit the stroke to history, emit the
    /// mask, return to Idle. Idempotent when already Idle.
    pub fn stroke_end(&mut self) -> Result<(), MaskError> {
        if self.last_point.take().is_none() {
            return Ok(());
        }
        self.history.push(&self.surface);
        self.refresh_mask()
    }

    // ------------------------------------------------------------------
    // History operations
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous snapshot and re-emit. No-op at the seed entry.
    pub fn undo(&mut self) -> Result<(), MaskError> {
        match self.history.step_back() {
            Some(snap) => {
                snap.restore_into(&mut self.surface);
                self.refresh_mask()
            }
            None => Ok(()),
        }
    }

    /// Restore the next snapshot and re-emit. No-op at the newest entry.
    pub fn redo(&mut self) -> Result<(), MaskError> {
        match self.history.step_forward() {
            Some(snap) => {
                snap.restore_into(&mut self.surface);
                self.refresh_mask()
            }
            None => Ok(()),
        }
    }

    /// Paint the surface fully transparent as a new, undoable history entry.
    pub fn clear(&mut self) -> Result<(), MaskError> {
        if !self.image_ready {
            return Ok(());
        }
        self.surface.clear();
        self.last_point = None;
        self.history.push(&self.surface);
        self.refresh_mask()
    }

    pub fn history_memory_usage(&self) -> usize {
        self.history.memory_usage()
    }

    // ------------------------------------------------------------------
    // Mask export
    // ------------------------------------------------------------------

    /// The most recently encoded mask. `None` when no image is loaded or the
    /// mask is entirely empty — both are equally invalid for submission.
    pub fn current_mask_bytes(&self) -> Option<&[u8]> {
        self.current_mask.as_deref()
    }

    /// Re-encode the live surface and notify the consumer. An encode failure
    /// is surfaced but does not corrupt the surface or history; encoding
    /// simply runs again on the next change.
    fn refresh_mask(&mut self) -> Result<(), MaskError> {
        self.revision += 1;
        if self.surface.is_blank() {
            self.current_mask = None;
        } else {
            self.current_mask = Some(self.surface.encode_png()?);
        }
        self.notify();
        Ok(())
    }

    fn notify(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener(self.current_mask.as_deref());
        }
    }
}

impl Default for MaskSession {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Encode a solid-gray PNG of the given size for load_image tests.
    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        use image::codecs::png::PngEncoder;
        use image::{ColorType, ImageEncoder};
        let img = RgbaImage::from_pixel(w, h, image::Rgba([90, 90, 90, 255]));
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(img.as_raw(), w, h, ColorType::Rgba8)
            .unwrap();
        out
    }

    fn loaded_session(w: u32, h: u32) -> MaskSession {
        let mut s = MaskSession::new();
        s.load_image(&png_bytes(w, h), w as f32, h as f32).unwrap();
        s
    }

    #[test]
    fn input_is_ignored_before_image_load() {
        let mut s = MaskSession::new();
        s.stroke_begin(MaskPoint::new(10.0, 10.0));
        assert!(!s.is_drawing());
        s.stroke_move(MaskPoint::new(20.0, 20.0));
        s.stroke_end().unwrap();
        assert!(s.current_mask_bytes().is_none());
    }

    #[test]
    fn gesture_emits_exactly_one_notification_on_stroke_end() {
        let mut s = loaded_session(100, 100);
        let count = Rc::new(RefCell::new(0usize));
        let c = Rc::clone(&count);
        s.set_listener(Box::new(move |_| *c.borrow_mut() += 1));

        s.stroke_begin(MaskPoint::new(20.0, 20.0));
        for i in 1..=5 {
            s.stroke_move(MaskPoint::new(20.0 + i as f32 * 8.0, 20.0));
        }
        assert_eq!(*count.borrow(), 0, "moves must not notify");
        s.stroke_end().unwrap();
        assert_eq!(*count.borrow(), 1);

        // Up while already Idle does not fire again.
        s.stroke_end().unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn dab_then_undo_scenario() {
        // Load a 100x100 surface, dab radius 10 at (50,50): the export has
        // max alpha at the center and zero at the corner; undo yields an
        // all-zero mask again.
        let mut s = loaded_session(100, 100);
        s.stroke_begin(MaskPoint::new(50.0, 50.0));
        s.stroke_end().unwrap();

        let bytes = s.current_mask_bytes().expect("mask after stroke");
        let decoded = image::load_from_memory(bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (100, 100));
        assert_eq!(decoded.get_pixel(50, 50).0[3], 255);
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);

        s.undo().unwrap();
        assert!(s.current_mask_bytes().is_none());
        assert!(s.surface().is_blank());
    }

    #[test]
    fn undo_n_times_then_redo_n_times_restores_exact_pixels() {
        let mut s = loaded_session(120, 80);
        for i in 0..4 {
            s.stroke_begin(MaskPoint::new(15.0 + i as f32 * 25.0, 40.0));
            s.stroke_move(MaskPoint::new(20.0 + i as f32 * 25.0, 50.0));
            s.stroke_end().unwrap();
        }
        let after_strokes = s.surface().raw().to_vec();

        for _ in 0..4 {
            s.undo().unwrap();
        }
        assert!(s.surface().is_blank());
        assert!(!s.can_undo());

        for _ in 0..4 {
            s.redo().unwrap();
        }
        assert_eq!(s.surface().raw(), &after_strokes[..]);
        assert!(!s.can_redo());
    }

    #[test]
    fn new_stroke_after_undo_discards_redo() {
        let mut s = loaded_session(64, 64);
        s.stroke_begin(MaskPoint::new(10.0, 10.0));
        s.stroke_end().unwrap();
        s.stroke_begin(MaskPoint::new(40.0, 40.0));
        s.stroke_end().unwrap();

        s.undo().unwrap();
        assert!(s.can_redo());

        s.stroke_begin(MaskPoint::new(55.0, 20.0));
        s.stroke_end().unwrap();
        assert!(!s.can_redo());
    }

    #[test]
    fn clear_is_undoable_and_empties_the_mask() {
        let mut s = loaded_session(64, 64);
        s.stroke_begin(MaskPoint::new(30.0, 30.0));
        s.stroke_end().unwrap();
        assert!(s.current_mask_bytes().is_some());

        s.clear().unwrap();
        assert!(s.current_mask_bytes().is_none());
        assert!(s.can_undo());

        s.undo().unwrap();
        assert!(s.current_mask_bytes().is_some());
    }

    #[test]
    fn mode_switch_mid_session_erases_overlap() {
        let mut s = loaded_session(64, 64);
        s.stroke_begin(MaskPoint::new(32.0, 32.0));
        s.stroke_end().unwrap();

        s.set_brush_mode(BrushMode::Erase);
        s.set_brush_radius(30.0);
        s.stroke_begin(MaskPoint::new(32.0, 32.0));
        s.stroke_end().unwrap();

        assert!(s.surface().is_blank());
    }

    #[test]
    fn brush_change_applies_mid_stroke() {
        let mut s = loaded_session(200, 60);
        s.set_brush_radius(4.0);
        s.stroke_begin(MaskPoint::new(10.0, 30.0));
        s.set_brush_radius(20.0);
        s.stroke_move(MaskPoint::new(100.0, 30.0));
        s.stroke_end().unwrap();

        // The wide segment reaches pixels the narrow radius never could.
        assert_eq!(s.surface().pixels().get_pixel(60, 45).0[3], 255);
    }

    #[test]
    fn failed_load_leaves_previous_session_untouched() {
        let mut s = loaded_session(100, 100);
        s.stroke_begin(MaskPoint::new(50.0, 50.0));
        s.stroke_end().unwrap();
        let mask_before = s.current_mask_bytes().unwrap().to_vec();

        let err = s.load_image(b"corrupt bytes", 100.0, 100.0);
        assert!(matches!(err, Err(MaskError::Decode(_))));
        assert_eq!(s.current_mask_bytes().unwrap(), &mask_before[..]);
        assert!(s.image_ready());

        // A subsequent valid load starts clean at the new size.
        s.load_image(&png_bytes(80, 40), 80.0, 40.0).unwrap();
        assert_eq!(s.surface().width(), 80);
        assert_eq!(s.surface().height(), 40);
        assert!(s.surface().is_blank());
        assert!(s.current_mask_bytes().is_none());
        assert!(!s.can_undo());
    }

    #[test]
    fn load_notifies_with_none() {
        let mut s = MaskSession::new();
        let seen = Rc::new(RefCell::new(Vec::<bool>::new()));
        let sc = Rc::clone(&seen);
        s.set_listener(Box::new(move |mask| sc.borrow_mut().push(mask.is_some())));

        s.load_image(&png_bytes(50, 50), 50.0, 50.0).unwrap();
        assert_eq!(&*seen.borrow(), &[false]);
    }

    #[test]
    fn surface_matches_letterboxed_view_dimensions() {
        let mut s = MaskSession::new();
        let fit = s.load_image(&png_bytes(400, 100), 800.0, 600.0).unwrap();
        assert_eq!((fit.w, fit.h), (800, 200));
        assert_eq!(s.surface().width(), 800);
        assert_eq!(s.surface().height(), 200);
    }
}
