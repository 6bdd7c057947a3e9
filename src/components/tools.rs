// ============================================================================
// TOOL PANEL — brush controls, undo/redo/clear
// ============================================================================

use eframe::egui;

use crate::canvas::BrushMode;
use crate::session::MaskSession;

pub const MIN_BRUSH_RADIUS: f32 = 2.0;
pub const MAX_BRUSH_RADIUS: f32 = 100.0;

#[derive(Default)]
pub struct ToolPanel {
    show_memory_info: bool,
}

impl ToolPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, session: &mut MaskSession) {
        ui.heading("Brush");

        let mut brush = session.brush();
        ui.horizontal(|ui| {
            for mode in [BrushMode::Draw, BrushMode::Erase] {
                if ui
                    .selectable_label(brush.mode == mode, mode.label())
                    .clicked()
                {
                    brush.mode = mode;
                }
            }
        });
        ui.add(
            egui::Slider::new(&mut brush.radius, MIN_BRUSH_RADIUS..=MAX_BRUSH_RADIUS)
                .text("Radius")
                .suffix(" px"),
        );
        // Applies immediately, even to a stroke currently being dragged.
        session.set_brush(brush);

        ui.separator();
        ui.horizontal(|ui| {
            // Enablement is derived from the history index each frame.
            if ui
                .add_enabled(session.can_undo(), egui::Button::new("⟲ Undo"))
                .clicked()
            {
                if let Err(e) = session.undo() {
                    crate::log_err!("Undo failed to re-export mask: {}", e);
                }
            }
            if ui
                .add_enabled(session.can_redo(), egui::Button::new("⟳ Redo"))
                .clicked()
            {
                if let Err(e) = session.redo() {
                    crate::log_err!("Redo failed to re-export mask: {}", e);
                }
            }
            if ui
                .add_enabled(session.image_ready(), egui::Button::new("Clear"))
                .clicked()
            {
                if let Err(e) = session.clear() {
                    crate::log_err!("Clear failed to re-export mask: {}", e);
                }
            }
        });

        ui.horizontal(|ui| {
            if ui
                .small_button("ℹ")
                .on_hover_text("Show history memory usage")
                .clicked()
            {
                self.show_memory_info = !self.show_memory_info;
            }
            if self.show_memory_info {
                let mem_mb = session.history_memory_usage() as f64 / (1024.0 * 1024.0);
                ui.label(format!("History: {:.2} MB", mem_mb));
            }
        });
    }
}
