// ============================================================================
// MASK HISTORY — linear undo/redo over full surface snapshots
// ============================================================================
//
// The history is an arena of snapshots plus a current-position index, not a
// pair of stacks: the entry at the index always equals the live surface, the
// blank initial state sits at index 0, and pushing truncates any redo branch.
// The index only moves through the clamped step methods, so out-of-bounds
// positions are unrepresentable.

use crate::canvas::MaskSurface;

/// A full copy of the surface's pixels at one point in time.
#[derive(Clone)]
pub struct MaskSnapshot {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MaskSnapshot {
    pub fn capture(surface: &MaskSurface) -> Self {
        Self {
            width: surface.width(),
            height: surface.height(),
            data: surface.raw().to_vec(),
        }
    }

    pub fn restore_into(&self, surface: &mut MaskSurface) {
        surface.restore_raw(self.width, self.height, &self.data);
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Linear undo/redo history for one mask session. Created seeded with the
/// blank surface at index 0 and discarded when a new source image loads.
pub struct MaskHistory {
    snapshots: Vec<MaskSnapshot>,
    index: usize,
}

impl MaskHistory {
    /// Seed the history with the initial (blank) surface at index 0.
    pub fn seeded(initial: &MaskSurface) -> Self {
        Self {
            snapshots: vec![MaskSnapshot::capture(initial)],
            index: 0,
        }
    }

    /// Append a snapshot of the surface after a committed stroke or clear.
    /// Discards the redo branch first — standard linear undo, no branching.
    pub fn push(&mut self, surface: &MaskSurface) {
        self.snapshots.truncate(self.index + 1);
        self.snapshots.push(MaskSnapshot::capture(surface));
        self.index = self.snapshots.len() - 1;
    }

    /// Move one step back and return the snapshot to restore. Safe no-op at
    /// index 0.
    pub fn step_back(&mut self) -> Option<&MaskSnapshot> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.snapshots.get(self.index)
    }

    /// Move one step forward and return the snapshot to restore. Safe no-op
    /// at the newest entry.
    pub fn step_forward(&mut self) -> Option<&MaskSnapshot> {
        if self.index + 1 >= self.snapshots.len() {
            return None;
        }
        self.index += 1;
        self.snapshots.get(self.index)
    }

    // Enablement is derived from the index on every call, never cached.

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Total bytes held across all snapshots (for the status line).
    pub fn memory_usage(&self) -> usize {
        self.snapshots.iter().map(|s| s.memory_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BrushMode, MaskPoint};

    fn surface_with_dab(at: f32) -> MaskSurface {
        let mut s = MaskSurface::blank(32, 32);
        s.draw_dab(MaskPoint::new(at, at), 4.0, BrushMode::Draw);
        s
    }

    #[test]
    fn seeded_history_has_blank_at_index_zero() {
        let blank = MaskSurface::blank(32, 32);
        let h = MaskHistory::seeded(&blank);
        assert_eq!(h.len(), 1);
        assert_eq!(h.index(), 0);
        assert!(!h.can_undo());
        assert!(!h.can_redo());
    }

    #[test]
    fn undo_redo_round_trip_is_bit_identical() {
        let blank = MaskSurface::blank(32, 32);
        let mut h = MaskHistory::seeded(&blank);
        let strokes = [
            surface_with_dab(8.0),
            surface_with_dab(16.0),
            surface_with_dab(24.0),
        ];
        for s in &strokes {
            h.push(s);
        }

        let mut live = strokes[2].clone();
        for _ in 0..3 {
            let snap = MaskSnapshot::clone(h.step_back().expect("undo available"));
            snap.restore_into(&mut live);
        }
        assert_eq!(live.raw(), blank.raw());
        assert!(!h.can_undo());

        for stroke in &strokes {
            let snap = h.step_forward().expect("redo available");
            assert_eq!(snap.data, stroke.raw());
        }
        assert!(!h.can_redo());
    }

    #[test]
    fn push_after_undo_truncates_redo_branch() {
        let blank = MaskSurface::blank(32, 32);
        let mut h = MaskHistory::seeded(&blank);
        h.push(&surface_with_dab(8.0));
        h.push(&surface_with_dab(16.0));

        h.step_back();
        assert!(h.can_redo());

        h.push(&surface_with_dab(24.0));
        assert!(!h.can_redo());
        assert_eq!(h.len(), 3);
        assert_eq!(h.index(), 2);
    }

    #[test]
    fn boundary_steps_are_safe_noops() {
        let blank = MaskSurface::blank(8, 8);
        let mut h = MaskHistory::seeded(&blank);
        assert!(h.step_back().is_none());
        assert!(h.step_forward().is_none());
        assert_eq!(h.index(), 0);
    }

    #[test]
    fn memory_usage_counts_all_snapshots() {
        let blank = MaskSurface::blank(10, 10);
        let mut h = MaskHistory::seeded(&blank);
        h.push(&surface_with_dab(5.0));
        assert_eq!(h.memory_usage(), 10 * 10 * 4 + 32 * 32 * 4);
    }
}
