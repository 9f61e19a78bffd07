//! Drag / edge-snap / docked-side state machine.

use std::time::Instant;
use tracing::debug;

use crate::animation::{AnimationScheduler, Channel, Easing, Subject};
use crate::constants::{anim, panel};
use crate::layout;
use crate::types::{Dimensions, Position, Rect, Side};

/// Shared dock flags. Only DockController and AutoHideController write this.
#[derive(Debug, Clone, Copy)]
pub struct DockState {
    pub side: Side,
    /// Auto-hide suppressed entirely while set
    pub lock: bool,
    /// Set around modal sub-tasks (drag, rename, add-category, delete, drop)
    pub operation_in_progress: bool,
}

impl DockState {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            lock: false,
            operation_in_progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockPhase {
    Docked,
    Dragging,
    Animating(Side),
}

/// Decide which edge a released panel snaps to.
///
/// Left wins when it is inside the hard threshold, or when it is both the
/// nearer edge and inside twice the threshold. Right wins inside the hard
/// threshold. Otherwise the panel keeps its current side.
pub fn choose_side(distance_left: i16, distance_right: i16, threshold: i16, current: Side) -> Side {
    if distance_left < threshold || (distance_left < distance_right && distance_left < 2 * threshold)
    {
        Side::Left
    } else if distance_right < threshold {
        Side::Right
    } else {
        current
    }
}

#[derive(Debug)]
pub struct DockController {
    phase: DockPhase,
    /// Pointer offset into the panel at drag start
    grab: Position,
    /// Exact x the running snap animation ends on
    snap_target_x: f32,
}

impl DockController {
    pub fn new() -> Self {
        Self {
            phase: DockPhase::Docked,
            grab: Position::default(),
            snap_target_x: 0.0,
        }
    }

    pub fn phase(&self) -> DockPhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        self.phase == DockPhase::Dragging
    }

    /// Pointer-down on non-interactive chrome starts a drag
    pub fn begin_drag(&mut self, state: &mut DockState, pointer: Position, panel_pos: Position) {
        self.phase = DockPhase::Dragging;
        self.grab = Position::new(pointer.x - panel_pos.x, pointer.y - panel_pos.y);
        state.operation_in_progress = true;
        debug!(grab_x = self.grab.x, grab_y = self.grab.y, "drag started");
    }

    /// Direct (uneased) position while dragging, clamped to the screen
    pub fn drag_to(
        &self,
        pointer: Position,
        panel_size: Dimensions,
        screen: Dimensions,
    ) -> Position {
        layout::clamp_to_screen(
            pointer.x - self.grab.x,
            pointer.y - self.grab.y,
            panel_size.width,
            panel_size.height,
            screen.width,
            screen.height,
        )
    }

    /// Pointer-up: pick a side and start the eased snap back to it.
    /// Returns the chosen side.
    pub fn end_drag(
        &mut self,
        state: &mut DockState,
        scheduler: &mut AnimationScheduler,
        panel_rect: Rect,
        shadow_margin: u16,
        screen: Dimensions,
    ) -> Side {
        let distance_left = panel_rect.left() + shadow_margin as i16;
        let distance_right =
            screen.width as i16 - (panel_rect.right() - shadow_margin as i16);
        let side = choose_side(
            distance_left,
            distance_right,
            panel::SNAP_THRESHOLD,
            state.side,
        );
        state.side = side;
        state.operation_in_progress = false;

        self.snap_target_x =
            layout::docked_x(side, screen.width, panel_rect.width, shadow_margin) as f32;
        self.phase = DockPhase::Animating(side);
        scheduler.start(
            (Subject::Panel, Channel::DockX),
            panel_rect.x as f32,
            self.snap_target_x,
            anim::TICK_INTERVAL * anim::SNAP_STEPS,
            Easing::CubicEaseOut,
        );
        debug!(?side, dl = distance_left, dr = distance_right, "drag released, snapping");
        side
    }

    /// Per-tick position while animating. Once the scheduler entry settles,
    /// the final position is exact and the phase returns to `Docked`.
    pub fn animated_x(&mut self, scheduler: &AnimationScheduler, now_settled: bool) -> Option<i16> {
        match self.phase {
            DockPhase::Animating(_) => {
                let key = (Subject::Panel, Channel::DockX);
                if now_settled || !scheduler.is_active(key) {
                    self.phase = DockPhase::Docked;
                    Some(self.snap_target_x.round() as i16)
                } else {
                    Some(scheduler.value(key, self.snap_target_x).round() as i16)
                }
            }
            _ => None,
        }
    }

    #[cfg(test)]
    fn force_phase(&mut self, phase: DockPhase) {
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn forty_px_from_left_with_threshold_fifty_snaps_left() {
        // Regardless of prior side
        assert_eq!(choose_side(40, 1800, 50, Side::Right), Side::Left);
        assert_eq!(choose_side(40, 1800, 50, Side::Left), Side::Left);
    }

    #[test]
    fn near_right_edge_snaps_right() {
        assert_eq!(choose_side(1800, 45, 50, Side::Left), Side::Right);
    }

    #[test]
    fn nearer_left_inside_double_threshold_wins() {
        // Left is not inside the hard threshold but is nearer and < 2x
        assert_eq!(choose_side(80, 200, 50, Side::Right), Side::Left);
    }

    #[test]
    fn far_from_both_edges_keeps_current_side() {
        assert_eq!(choose_side(500, 600, 50, Side::Right), Side::Right);
        assert_eq!(choose_side(600, 500, 50, Side::Left), Side::Left);
    }

    #[test]
    fn drag_positions_follow_pointer_minus_grab() {
        let mut ctl = DockController::new();
        let mut state = DockState::new(Side::Right);
        ctl.begin_drag(&mut state, Position::new(110, 220), Position::new(100, 200));
        assert!(state.operation_in_progress);

        let pos = ctl.drag_to(
            Position::new(300, 400),
            Dimensions::new(200, 500),
            Dimensions::new(1920, 1080),
        );
        assert_eq!(pos, Position::new(290, 380));
    }

    #[test]
    fn drag_is_clamped_to_working_area() {
        let mut ctl = DockController::new();
        let mut state = DockState::new(Side::Right);
        ctl.begin_drag(&mut state, Position::new(0, 0), Position::new(0, 0));
        let pos = ctl.drag_to(
            Position::new(-500, 5000),
            Dimensions::new(200, 500),
            Dimensions::new(1920, 1080),
        );
        assert_eq!(pos, Position::new(0, 580));
    }

    #[test]
    fn release_near_right_edge_animates_to_exact_docked_x() {
        let mut ctl = DockController::new();
        let mut state = DockState::new(Side::Left);
        let mut sched = AnimationScheduler::new();
        ctl.force_phase(DockPhase::Dragging);

        // Panel right edge 45px from the screen edge (threshold 50)
        let screen = Dimensions::new(1920, 1080);
        let rect = Rect::new(1920 - 200 - 45 + 8, 100, 200, 400);
        let side = ctl.end_drag(&mut state, &mut sched, rect, 8, screen);
        assert_eq!(side, Side::Right);
        assert_eq!(state.side, Side::Right);
        assert!(!state.operation_in_progress);
        assert_eq!(ctl.phase(), DockPhase::Animating(Side::Right));

        // Drive the animation to completion
        let deadline = Instant::now() + anim::TICK_INTERVAL * anim::SNAP_STEPS
            + Duration::from_millis(50);
        let settled = !sched.tick(deadline);
        let final_x = ctl.animated_x(&sched, settled).unwrap();
        // Right edge exactly shadow_margin inside the screen edge
        assert_eq!(final_x, layout::docked_x(Side::Right, 1920, 200, 8));
        assert_eq!(final_x + 200 - 8, 1920);
        assert_eq!(ctl.phase(), DockPhase::Docked);
    }

    #[test]
    fn release_far_from_edges_resnaps_to_current_side() {
        let mut ctl = DockController::new();
        let mut state = DockState::new(Side::Right);
        let mut sched = AnimationScheduler::new();
        ctl.force_phase(DockPhase::Dragging);

        let screen = Dimensions::new(1920, 1080);
        let rect = Rect::new(800, 100, 200, 400);
        let side = ctl.end_drag(&mut state, &mut sched, rect, 8, screen);
        assert_eq!(side, Side::Right);
        // Still re-snaps to the fully aligned position for that side
        assert!(sched.is_active((Subject::Panel, Channel::DockX)));
    }
}
