//! Expanded/collapsed width state machine with pointer-proximity sampling.
//!
//! Width moves by exponential smoothing rather than fixed-duration easing:
//! the trigger (pointer proximity) can re-fire mid-animation, and smoothing
//! retargets for free. Within a small threshold of the target the width
//! snaps exactly and the panel is re-anchored to its docked edge.

use tracing::debug;

use crate::constants::anim;
use crate::dock::DockState;
use crate::types::{Position, Rect, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidePhase {
    Expanded,
    Collapsing,
    Collapsed,
    Expanding,
}

#[derive(Debug)]
pub struct AutoHideController {
    expanded_width: f32,
    width: f32,
    target: f32,
}

impl AutoHideController {
    pub fn new(expanded_width: u16) -> Self {
        let w = expanded_width as f32;
        Self {
            expanded_width: w,
            width: w,
            target: w,
        }
    }

    pub fn width(&self) -> u16 {
        self.width.round() as u16
    }

    /// Keep the expanded target in sync when panel content resizes
    pub fn set_expanded_width(&mut self, expanded_width: u16) {
        let w = expanded_width as f32;
        if self.target == self.expanded_width {
            self.target = w;
        }
        if self.width == self.expanded_width {
            self.width = w;
        }
        self.expanded_width = w;
    }

    pub fn phase(&self) -> HidePhase {
        if self.width == self.target {
            if self.target == 0.0 {
                HidePhase::Collapsed
            } else {
                HidePhase::Expanded
            }
        } else if self.target == 0.0 {
            HidePhase::Collapsing
        } else {
            HidePhase::Expanding
        }
    }

    pub fn is_settled(&self) -> bool {
        self.width == self.target
    }

    /// One fixed-rate sample of the global pointer. Skipped entirely while
    /// the dock is locked.
    pub fn sample(&mut self, state: &DockState, pointer: Position, panel: Rect, strip: Rect) {
        if state.lock {
            return;
        }
        match self.phase() {
            HidePhase::Expanded | HidePhase::Expanding => {
                if !panel.contains(pointer.x, pointer.y) && !state.operation_in_progress {
                    if self.target != 0.0 {
                        debug!("pointer left panel, collapsing");
                    }
                    self.target = 0.0;
                }
            }
            HidePhase::Collapsed | HidePhase::Collapsing => {
                if strip.contains(pointer.x, pointer.y) {
                    if self.target != self.expanded_width {
                        debug!("pointer on edge strip, expanding");
                    }
                    self.target = self.expanded_width;
                }
            }
        }
    }

    /// Locking while collapsed forces an immediate expand
    pub fn set_lock(&mut self, state: &mut DockState, lock: bool) {
        state.lock = lock;
        if lock && self.target != self.expanded_width {
            self.target = self.expanded_width;
        }
    }

    /// Advance the width one tick; returns the new width when it moved
    pub fn tick(&mut self) -> Option<u16> {
        if self.is_settled() {
            return None;
        }
        self.width += (self.target - self.width) * anim::AUTOHIDE_RATE;
        if (self.target - self.width).abs() < anim::AUTOHIDE_SNAP {
            self.width = self.target;
        }
        Some(self.width())
    }

    /// Window x keeping the visible edge flush while the width animates:
    /// left dock pins the left edge, right dock pins the right edge.
    pub fn anchored_x(
        &self,
        side: Side,
        screen_width: u16,
        shadow_margin: u16,
        left_x: i16,
    ) -> i16 {
        match side {
            Side::Left => left_x,
            Side::Right => screen_width as i16 - self.width() as i16 + shadow_margin as i16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn panel_rect() -> Rect {
        Rect::new(1700, 100, 220, 400)
    }

    fn strip() -> Rect {
        Rect::new(1916, 100, 4, 400)
    }

    fn outside() -> Position {
        Position::new(500, 500)
    }

    #[test]
    fn pointer_leaving_starts_collapse_after_one_sample() {
        let mut ctl = AutoHideController::new(220);
        let state = DockState::new(Side::Right);
        assert_eq!(ctl.phase(), HidePhase::Expanded);
        ctl.sample(&state, outside(), panel_rect(), strip());
        assert_eq!(ctl.phase(), HidePhase::Collapsing);
    }

    #[test]
    fn collapse_is_monotone_then_snaps_to_zero() {
        let mut ctl = AutoHideController::new(220);
        let state = DockState::new(Side::Right);
        ctl.sample(&state, outside(), panel_rect(), strip());

        let mut prev = 220.0f32;
        let mut ticks = 0;
        while let Some(w) = ctl.tick() {
            assert!((w as f32) < prev + 1.0, "width increased during collapse");
            prev = w as f32;
            ticks += 1;
            assert!(ticks < 100, "collapse never settled");
        }
        assert_eq!(ctl.width(), 0);
        assert_eq!(ctl.phase(), HidePhase::Collapsed);
    }

    #[test]
    fn lock_inhibits_collapse_for_any_sample_sequence() {
        let mut ctl = AutoHideController::new(220);
        let mut state = DockState::new(Side::Right);
        ctl.set_lock(&mut state, true);
        for _ in 0..50 {
            ctl.sample(&state, outside(), panel_rect(), strip());
            assert_eq!(ctl.phase(), HidePhase::Expanded);
        }
    }

    #[test]
    fn unlock_with_pointer_outside_collapses_immediately() {
        let mut ctl = AutoHideController::new(220);
        let mut state = DockState::new(Side::Right);
        ctl.set_lock(&mut state, true);
        ctl.sample(&state, outside(), panel_rect(), strip());
        assert_eq!(ctl.phase(), HidePhase::Expanded);

        ctl.set_lock(&mut state, false);
        ctl.sample(&state, outside(), panel_rect(), strip());
        assert_eq!(ctl.phase(), HidePhase::Collapsing);
    }

    #[test]
    fn locking_while_collapsed_forces_expand() {
        let mut ctl = AutoHideController::new(220);
        let mut state = DockState::new(Side::Right);
        ctl.sample(&state, outside(), panel_rect(), strip());
        while ctl.tick().is_some() {}
        assert_eq!(ctl.phase(), HidePhase::Collapsed);

        ctl.set_lock(&mut state, true);
        assert_eq!(ctl.phase(), HidePhase::Expanding);
        while ctl.tick().is_some() {}
        assert_eq!(ctl.width(), 220);
    }

    #[test]
    fn operation_in_progress_suspends_collapse() {
        let mut ctl = AutoHideController::new(220);
        let mut state = DockState::new(Side::Right);
        state.operation_in_progress = true;
        for _ in 0..10 {
            ctl.sample(&state, outside(), panel_rect(), strip());
        }
        assert_eq!(ctl.phase(), HidePhase::Expanded);

        state.operation_in_progress = false;
        ctl.sample(&state, outside(), panel_rect(), strip());
        assert_eq!(ctl.phase(), HidePhase::Collapsing);
    }

    #[test]
    fn edge_strip_reexpands_mid_collapse() {
        let mut ctl = AutoHideController::new(220);
        let state = DockState::new(Side::Right);
        ctl.sample(&state, outside(), panel_rect(), strip());
        ctl.tick();
        ctl.tick();
        assert_eq!(ctl.phase(), HidePhase::Collapsing);

        // Pointer hits the strip while still collapsing
        ctl.sample(&state, Position::new(1918, 200), panel_rect(), strip());
        assert_eq!(ctl.phase(), HidePhase::Expanding);
        while ctl.tick().is_some() {}
        assert_eq!(ctl.width(), 220);
    }

    #[test]
    fn right_dock_reanchors_flush_to_screen_edge() {
        let mut ctl = AutoHideController::new(220);
        let state = DockState::new(Side::Right);
        // Fully expanded: x = screen_right - width + margin
        assert_eq!(ctl.anchored_x(Side::Right, 1920, 8, -8), 1920 - 220 + 8);
        // Mid-collapse the right edge stays pinned
        ctl.sample(&state, outside(), panel_rect(), strip());
        ctl.tick();
        let w = ctl.width() as i16;
        assert_eq!(ctl.anchored_x(Side::Right, 1920, 8, -8), 1920 - w + 8);
        // Left dock keeps the stored left edge
        assert_eq!(ctl.anchored_x(Side::Left, 1920, 8, -8), -8);
    }
}
