//! Per-item hover scale, driven through the shared scheduler.
//!
//! Scales live in a side table keyed by stable item id, so an item being
//! renamed or reloaded never orphans its animation.

use std::collections::HashMap;

use crate::animation::{AnimationScheduler, Channel, Easing, Subject};
use crate::constants::anim;

#[derive(Debug, Default)]
pub struct HoverAnimationController {
    hovered: Option<u32>,
    /// Last settled scale per item id; absent means 1.0
    settled: HashMap<u32, f32>,
}

impl HoverAnimationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hovered(&self) -> Option<u32> {
        self.hovered
    }

    /// Report the item currently under the pointer (None when over chrome).
    /// Returns true when the hover target changed.
    pub fn set_hovered(&mut self, scheduler: &mut AnimationScheduler, id: Option<u32>) -> bool {
        if id == self.hovered {
            return false;
        }
        if let Some(prev) = self.hovered {
            let current = self.scale_of(scheduler, prev);
            scheduler.start(
                (Subject::Item(prev), Channel::HoverScale),
                current,
                1.0,
                anim::HOVER_DURATION,
                Easing::CubicEaseOut,
            );
            self.settled.insert(prev, 1.0);
        }
        if let Some(next) = id {
            let current = self.scale_of(scheduler, next);
            scheduler.start(
                (Subject::Item(next), Channel::HoverScale),
                current,
                anim::HOVER_TARGET_SCALE,
                anim::HOVER_DURATION,
                Easing::CubicEaseOut,
            );
            self.settled.insert(next, anim::HOVER_TARGET_SCALE);
        }
        self.hovered = id;
        true
    }

    /// Current scale for an item; items never tracked default to 1.0
    pub fn scale_of(&self, scheduler: &AnimationScheduler, id: u32) -> f32 {
        let fallback = self.settled.get(&id).copied().unwrap_or(1.0);
        scheduler.value((Subject::Item(id), Channel::HoverScale), fallback)
    }

    /// Drop side-table entries for deleted items
    pub fn forget(&mut self, scheduler: &mut AnimationScheduler, id: u32) {
        self.settled.remove(&id);
        scheduler.cancel((Subject::Item(id), Channel::HoverScale));
        if self.hovered == Some(id) {
            self.hovered = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn untracked_items_read_scale_one() {
        let hover = HoverAnimationController::new();
        let sched = AnimationScheduler::new();
        assert_eq!(hover.scale_of(&sched, 42), 1.0);
    }

    #[test]
    fn hover_reaches_target_within_duration_without_overshoot() {
        let mut hover = HoverAnimationController::new();
        let mut sched = AnimationScheduler::new();
        assert!(hover.set_hovered(&mut sched, Some(3)));

        let start = Instant::now();
        let mut prev = 1.0f32;
        for ms in (10..=anim::HOVER_DURATION.as_millis() as u64 + 20).step_by(10) {
            sched.tick(start + Duration::from_millis(ms));
            let s = hover.scale_of(&sched, 3);
            assert!(s >= prev - anim::EPSILON, "scale not monotone");
            assert!(
                (1.0 - anim::EPSILON..=anim::HOVER_TARGET_SCALE + anim::EPSILON).contains(&s),
                "scale out of bounds: {s}"
            );
            prev = s;
        }
        assert!((prev - anim::HOVER_TARGET_SCALE).abs() < anim::EPSILON);
    }

    #[test]
    fn hover_change_animates_old_item_back_down() {
        let mut hover = HoverAnimationController::new();
        let mut sched = AnimationScheduler::new();
        hover.set_hovered(&mut sched, Some(1));
        sched.tick(Instant::now() + anim::HOVER_DURATION * 2);

        hover.set_hovered(&mut sched, Some(2));
        assert!(sched.is_active((Subject::Item(1), Channel::HoverScale)));
        assert!(sched.is_active((Subject::Item(2), Channel::HoverScale)));

        sched.tick(Instant::now() + anim::HOVER_DURATION * 2);
        assert_eq!(hover.scale_of(&sched, 1), 1.0);
        assert!((hover.scale_of(&sched, 2) - anim::HOVER_TARGET_SCALE).abs() < anim::EPSILON);
    }

    #[test]
    fn repeated_same_target_is_a_no_op() {
        let mut hover = HoverAnimationController::new();
        let mut sched = AnimationScheduler::new();
        hover.set_hovered(&mut sched, Some(5));
        sched.tick(Instant::now() + anim::HOVER_DURATION * 2);
        assert!(sched.is_idle());
        // Same id again must not restart the animation
        assert!(!hover.set_hovered(&mut sched, Some(5)));
        assert!(sched.is_idle());
    }

    #[test]
    fn forget_clears_state_and_animation() {
        let mut hover = HoverAnimationController::new();
        let mut sched = AnimationScheduler::new();
        hover.set_hovered(&mut sched, Some(9));
        hover.forget(&mut sched, 9);
        assert_eq!(hover.hovered(), None);
        assert!(sched.is_idle());
        assert_eq!(hover.scale_of(&sched, 9), 1.0);
    }
}
