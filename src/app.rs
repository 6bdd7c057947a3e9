// ============================================================================
// INPAINTFE APPLICATION — GUI shell around the mask session
// ============================================================================
//
// Layout: top bar (open photo, service health), right panel (brush tools,
// prompt, generation parameters, result actions), central canvas (source
// photo + red-tinted mask overlay, or the generated result).
//
// The mask engine runs synchronously inside the input handlers. The only
// threaded work is the HTTP submission: one job at a time, spawned on a
// worker thread with its result polled from an mpsc channel each frame.

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Stroke, TextureHandle, TextureOptions};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::canvas::{self, MaskPoint};
use crate::components::tools::ToolPanel;
use crate::config::Settings;
use crate::io;
use crate::ops::inpaint::{self, InpaintClient, InpaintError, InpaintJob, InpaintParams};
use crate::session::MaskSession;

/// Fixed on-screen bounds the photo is letterboxed into. The mask surface
/// adopts the fitted rectangle's dimensions (view space).
pub const CANVAS_W: f32 = 760.0;
pub const CANVAS_H: f32 = 560.0;

const FULL_UV: Rect = Rect {
    min: Pos2 { x: 0.0, y: 0.0 },
    max: Pos2 { x: 1.0, y: 1.0 },
};

/// Red tint multiplied over the white mask texture for the overlay.
const MASK_TINT: Color32 = Color32::from_rgba_premultiplied(220, 60, 60, 160);

#[derive(Clone, Copy, PartialEq, Eq)]
enum HealthStatus {
    Unknown,
    Checking,
    Ok,
    Degraded,
}

pub struct InpaintFEApp {
    settings: Settings,
    session: MaskSession,
    tool_panel: ToolPanel,

    // Generation parameters
    params: InpaintParams,
    use_seed: bool,
    seed_value: i64,

    // Loaded photo
    source_bytes: Option<Vec<u8>>,
    source_texture: Option<TextureHandle>,

    // Mask overlay texture, re-uploaded when the session revision moves
    mask_texture: Option<TextureHandle>,
    uploaded_revision: u64,

    // Generated result
    result_bytes: Option<Vec<u8>>,
    result_texture: Option<TextureHandle>,
    show_result: bool,

    // In-flight work (single-flight per session)
    job_rx: Option<mpsc::Receiver<Result<Vec<u8>, InpaintError>>>,
    job_started: Option<Instant>,
    health_rx: Option<mpsc::Receiver<bool>>,
    health: HealthStatus,

    status: String,
}

impl InpaintFEApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = Settings::load();
        crate::log_info!(
            "Settings: endpoint {}, mock_mode {}",
            settings.api_url,
            settings.mock_mode()
        );
        let mut app = Self {
            settings,
            session: MaskSession::new(),
            tool_panel: ToolPanel::default(),
            params: InpaintParams::default(),
            use_seed: false,
            seed_value: 0,
            source_bytes: None,
            source_texture: None,
            mask_texture: None,
            uploaded_revision: 0,
            result_bytes: None,
            result_texture: None,
            show_result: false,
            job_rx: None,
            job_started: None,
            health_rx: None,
            health: HealthStatus::Unknown,
            status: "Open a photo to start".to_string(),
        };
        app.spawn_health_check();
        app
    }

    // ------------------------------------------------------------------
    // Background jobs
    // ------------------------------------------------------------------

    fn spawn_health_check(&mut self) {
        if self.health == HealthStatus::Checking {
            return;
        }
        let (tx, rx) = mpsc::channel();
        let settings = self.settings.clone();
        std::thread::spawn(move || {
            let _ = tx.send(InpaintClient::new(settings).health_check());
        });
        self.health_rx = Some(rx);
        self.health = HealthStatus::Checking;
    }

    fn spawn_inpaint_job(&mut self) {
        if self.job_rx.is_some() {
            return; // single-flight: never two submissions against one session
        }
        let Some(source) = self.source_bytes.clone() else {
            return;
        };
        let Some(mask) = self.session.current_mask_bytes().map(|b| b.to_vec()) else {
            return;
        };
        let Some(src_img) = self.session.source_image() else {
            return;
        };

        let mut params = self.params.clone();
        params.seed = self.use_seed.then_some(self.seed_value);

        // The editor paints in view space; match the image's native size
        // before submission.
        let mask = match inpaint::scale_mask_to(&mask, src_img.width(), src_img.height()) {
            Ok(m) => m,
            Err(e) => {
                self.status = e.to_string();
                crate::log_err!("Mask rescale failed: {}", e);
                return;
            }
        };

        match InpaintJob::build(&source, &mask, params, &self.settings) {
            Ok(job) => {
                let (tx, rx) = mpsc::channel();
                let settings = self.settings.clone();
                std::thread::spawn(move || {
                    let _ = tx.send(InpaintClient::new(settings).inpaint(&job));
                });
                self.job_rx = Some(rx);
                self.job_started = Some(Instant::now());
                self.status = "Generating…".to_string();
            }
            Err(e) => {
                self.status = e.to_string();
                crate::log_warn!("Submission rejected before send: {}", e);
            }
        }
    }

    fn poll_jobs(&mut self, ctx: &egui::Context) {
        if let Some(rx) = &self.job_rx {
            match rx.try_recv() {
                Ok(Ok(bytes)) => {
                    let elapsed = self
                        .job_started
                        .map(|t| t.elapsed().as_secs_f32())
                        .unwrap_or(0.0);
                    crate::log_info!(
                        "Inpaint finished: {} bytes in {:.1}s",
                        bytes.len(),
                        elapsed
                    );
                    self.status = format!("Done in {:.1}s", elapsed);
                    self.result_bytes = Some(bytes);
                    self.result_texture = None;
                    self.show_result = true;
                    self.job_rx = None;
                    self.job_started = None;
                }
                Ok(Err(e)) => {
                    crate::log_err!("Inpaint failed: {}", e);
                    self.status = e.to_string();
                    self.job_rx = None;
                    self.job_started = None;
                }
                Err(mpsc::TryRecvError::Empty) => {
                    ctx.request_repaint_after(Duration::from_millis(100));
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.status = "Inpaint worker vanished".to_string();
                    self.job_rx = None;
                    self.job_started = None;
                }
            }
        }

        if let Some(rx) = &self.health_rx {
            match rx.try_recv() {
                Ok(healthy) => {
                    self.health = if healthy {
                        HealthStatus::Ok
                    } else {
                        HealthStatus::Degraded
                    };
                    self.health_rx = None;
                }
                Err(mpsc::TryRecvError::Empty) => {
                    ctx.request_repaint_after(Duration::from_millis(250));
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.health = HealthStatus::Degraded;
                    self.health_rx = None;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Photo loading
    // ------------------------------------------------------------------

    fn open_photo(&mut self, ctx: &egui::Context) {
        let Some(path) = io::pick_source_image() else {
            return;
        };
        let bytes = match io::read_file_capped(&path, self.settings.max_file_size_mb) {
            Ok(b) => b,
            Err(e) => {
                self.status = e;
                return;
            }
        };
        match self.session.load_image(&bytes, CANVAS_W, CANVAS_H) {
            Ok(fit) => {
                crate::log_info!(
                    "Loaded {}: surface {}x{} at offset ({}, {})",
                    path.display(),
                    fit.w,
                    fit.h,
                    fit.x,
                    fit.y
                );
                // Session state reset succeeded; rebuild display state.
                self.source_bytes = Some(bytes);
                self.source_texture = self.session.source_image().map(|img| {
                    ctx.load_texture(
                        "source-photo",
                        ColorImage::from_rgba_unmultiplied(
                            [img.width() as usize, img.height() as usize],
                            img.as_raw(),
                        ),
                        TextureOptions::LINEAR,
                    )
                });
                self.mask_texture = None;
                self.uploaded_revision = 0;
                self.result_bytes = None;
                self.result_texture = None;
                self.show_result = false;
                self.status = format!("Editing {}", path.display());
            }
            Err(e) => {
                // Previous session (if any) is untouched on decode failure.
                crate::log_warn!("Failed to load {:?}: {}", path, e);
                self.status = e.to_string();
            }
        }
    }

    // ------------------------------------------------------------------
    // Canvas
    // ------------------------------------------------------------------

    fn refresh_mask_texture(&mut self, ctx: &egui::Context) {
        if self.uploaded_revision == self.session.revision() && self.mask_texture.is_some() {
            return;
        }
        let surface = self.session.surface();
        if surface.width() == 0 || surface.height() == 0 {
            return;
        }
        let img = ColorImage::from_rgba_unmultiplied(
            [surface.width() as usize, surface.height() as usize],
            surface.raw(),
        );
        match &mut self.mask_texture {
            Some(tex) if tex.size() == [surface.width() as usize, surface.height() as usize] => {
                tex.set(img, TextureOptions::NEAREST);
            }
            _ => {
                self.mask_texture =
                    Some(ctx.load_texture("mask-overlay", img, TextureOptions::NEAREST));
            }
        }
        self.uploaded_revision = self.session.revision();
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(egui::vec2(CANVAS_W, CANVAS_H), egui::Sense::drag());
        painter.rect_filled(response.rect, 4.0, Color32::from_gray(24));

        if self.show_result {
            self.paint_result(ui.ctx(), &painter, response.rect);
            return;
        }

        if !self.session.image_ready() {
            painter.text(
                response.rect.center(),
                egui::Align2::CENTER_CENTER,
                "Open a photo, then paint over the area to regenerate",
                egui::FontId::proportional(16.0),
                Color32::from_gray(120),
            );
            return;
        }

        let fit = self.session.fit();
        let image_rect = Rect::from_min_size(
            response.rect.min + egui::vec2(fit.x, fit.y),
            egui::vec2(fit.w as f32, fit.h as f32),
        );

        if let Some(tex) = &self.source_texture {
            painter.image(tex.id(), image_rect, FULL_UV, Color32::WHITE);
        }

        self.refresh_mask_texture(ui.ctx());
        if let Some(tex) = &self.mask_texture {
            painter.image(tex.id(), image_rect, FULL_UV, MASK_TINT);
        }

        self.handle_pointer(ui, &response, image_rect);

        // Brush outline under the cursor
        if let Some(hover) = response.hover_pos() {
            if image_rect.contains(hover) {
                painter.circle_stroke(
                    hover,
                    self.session.brush().radius,
                    Stroke::new(1.0, Color32::from_white_alpha(180)),
                );
            }
        }
    }

    /// Translate the frame's pointer state into stroke transitions. The
    /// session ignores anything that arrives before an image is ready.
    fn handle_pointer(&mut self, ui: &egui::Ui, response: &egui::Response, image_rect: Rect) {
        let pointer_down = ui.input(|i| i.pointer.primary_down());
        let pointer_pos = ui.input(|i| i.pointer.interact_pos());
        let over_image = pointer_pos.map(|p| image_rect.contains(p)).unwrap_or(false);

        if self.session.is_drawing() {
            // Leaving the image or releasing the button both commit the stroke.
            if !pointer_down || !over_image {
                if let Err(e) = self.session.stroke_end() {
                    crate::log_err!("Mask export failed at stroke end: {}", e);
                    self.status = e.to_string();
                }
            } else if let Some(pos) = pointer_pos {
                self.session
                    .stroke_move(MaskPoint::from_screen(pos, image_rect));
            }
        } else if pointer_down && over_image && response.hovered() {
            if let Some(pos) = pointer_pos {
                self.session
                    .stroke_begin(MaskPoint::from_screen(pos, image_rect));
            }
        }

        if self.session.is_drawing() {
            ui.ctx().request_repaint();
        }
    }

    fn paint_result(&mut self, ctx: &egui::Context, painter: &egui::Painter, bounds: Rect) {
        if self.result_texture.is_none() {
            if let Some(bytes) = &self.result_bytes {
                match canvas::decode_source_image(bytes) {
                    Ok(img) => {
                        self.result_texture = Some(ctx.load_texture(
                            "inpaint-result",
                            ColorImage::from_rgba_unmultiplied(
                                [img.width() as usize, img.height() as usize],
                                img.as_raw(),
                            ),
                            TextureOptions::LINEAR,
                        ));
                    }
                    Err(e) => {
                        crate::log_err!("Result image failed to decode: {}", e);
                        self.status = e.to_string();
                        self.result_bytes = None;
                        self.show_result = false;
                        return;
                    }
                }
            }
        }
        if let Some(tex) = &self.result_texture {
            let [w, h] = tex.size();
            let fit = canvas::fit_rect(w as u32, h as u32, bounds.width(), bounds.height());
            let rect = Rect::from_min_size(
                bounds.min + egui::vec2(fit.x, fit.y),
                egui::vec2(fit.w as f32, fit.h as f32),
            );
            painter.image(tex.id(), rect, FULL_UV, Color32::WHITE);
        }
    }

    // ------------------------------------------------------------------
    // Side panel
    // ------------------------------------------------------------------

    fn show_side_panel(&mut self, ui: &mut egui::Ui) {
        self.tool_panel.show(ui, &mut self.session);

        ui.separator();
        ui.heading("Generate");
        ui.label("Prompt");
        ui.add(
            egui::TextEdit::multiline(&mut self.params.prompt)
                .hint_text("Describe what should replace the painted area…")
                .desired_rows(3)
                .desired_width(f32::INFINITY),
        );
        let prompt_chars = self.params.prompt.chars().count();
        let over = prompt_chars > inpaint::MAX_PROMPT_LEN;
        ui.colored_label(
            if over { Color32::RED } else { Color32::GRAY },
            format!("{}/{}", prompt_chars, inpaint::MAX_PROMPT_LEN),
        );

        ui.horizontal(|ui| {
            ui.label("Strength");
            ui.add(
                egui::DragValue::new(&mut self.params.strength)
                    .speed(0.01)
                    .clamp_range(0.0..=1.0),
            );
            ui.label("Guidance");
            ui.add(
                egui::DragValue::new(&mut self.params.guidance_scale)
                    .speed(0.1)
                    .clamp_range(1.0..=20.0),
            );
        });
        ui.horizontal(|ui| {
            ui.checkbox(&mut self.use_seed, "Seed");
            if self.use_seed {
                ui.add(
                    egui::DragValue::new(&mut self.seed_value)
                        .clamp_range(0..=inpaint::MAX_SEED),
                );
            }
        });

        // An empty mask and "no mask drawn yet" are equally unsubmittable.
        let can_generate = self.session.current_mask_bytes().is_some() && self.job_rx.is_none();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(can_generate, egui::Button::new("✨ Generate"))
                .clicked()
            {
                self.spawn_inpaint_job();
            }
            if self.job_rx.is_some() {
                ui.spinner();
            }
        });

        if self.result_bytes.is_some() {
            ui.separator();
            ui.heading("Result");
            ui.horizontal(|ui| {
                if ui
                    .selectable_label(!self.show_result, "Editor")
                    .clicked()
                {
                    self.show_result = false;
                }
                if ui.selectable_label(self.show_result, "Result").clicked() {
                    self.show_result = true;
                }
            });
            if ui.button("💾 Save result…").clicked() {
                self.save_result();
            }
        }

        ui.separator();
        egui::CollapsingHeader::new("Service settings")
            .default_open(false)
            .show(ui, |ui| {
                ui.label("Endpoint");
                ui.text_edit_singleline(&mut self.settings.api_url);
                ui.label("API key (empty = mock mode)");
                ui.add(
                    egui::TextEdit::singleline(&mut self.settings.api_key).password(true),
                );
                if ui.button("Save settings").clicked() {
                    match self.settings.save() {
                        Ok(()) => {
                            self.status =
                                format!("Settings saved to {:?}", Settings::file_path());
                            self.spawn_health_check();
                        }
                        Err(e) => self.status = format!("Could not save settings: {}", e),
                    }
                }
            });
    }

    fn save_result(&mut self) {
        let Some(bytes) = self.result_bytes.clone() else {
            return;
        };
        let Some(path) = io::pick_result_path() else {
            return;
        };
        match io::write_result(&path, &bytes) {
            Ok(()) => self.status = format!("Saved {}", path.display()),
            Err(e) => self.status = e,
        }
    }

    fn health_label(&self) -> (&'static str, Color32) {
        match self.health {
            HealthStatus::Unknown => ("service: unknown", Color32::GRAY),
            HealthStatus::Checking => ("service: checking…", Color32::GRAY),
            HealthStatus::Ok => ("service: ok", Color32::from_rgb(80, 200, 100)),
            HealthStatus::Degraded => ("service: unreachable", Color32::from_rgb(230, 120, 60)),
        }
    }
}

impl eframe::App for InpaintFEApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_jobs(ctx);

        egui::TopBottomPanel::top("top-bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("📂 Open photo…").clicked() {
                    self.open_photo(ctx);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("↻").on_hover_text("Re-check service").clicked() {
                        self.spawn_health_check();
                    }
                    let (label, color) = self.health_label();
                    ui.colored_label(color, label);
                });
            });
        });

        egui::TopBottomPanel::bottom("status-bar").show(ctx, |ui| {
            ui.label(&self.status);
        });

        egui::SidePanel::right("tools")
            .resizable(false)
            .default_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.show_side_panel(ui);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| {
                self.show_canvas(ui);
            });
        });
    }
}
