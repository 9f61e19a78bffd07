//! Fixed-rate animation scheduler.
//!
//! A single scheduler advances every active animation on each event-loop
//! tick. It is cooperative and single-threaded: `tick` runs on the UI
//! thread between X events, never concurrently with a render.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::anim;

/// What an animation is attached to. Item ids are stable integers assigned
/// at creation and never reused, so animation lifetime is decoupled from
/// the item value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Panel,
    Item(u32),
}

/// Animated property. Auto-hide width is not here: it retargets every
/// sample and uses exponential smoothing inside its controller instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    HoverScale,
    DockX,
}

pub type AnimKey = (Subject, Channel);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    CubicEaseOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::CubicEaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv * inv
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    from: f32,
    to: f32,
    started: Instant,
    duration: Duration,
    easing: Easing,
    value: f32,
}

impl Entry {
    fn advance(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.started);
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
        };
        let eased = self.easing.apply(progress);
        self.value = self.from + (self.to - self.from) * eased;
        progress >= 1.0 && (self.value - self.to).abs() < anim::EPSILON
    }
}

/// Named-animation scheduler. Self-stops once its active set empties:
/// the event loop checks `is_idle()` to decide whether to keep ticking.
#[derive(Debug, Default)]
pub struct AnimationScheduler {
    active: HashMap<AnimKey, Entry>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or retarget) the animation for `key`. Starting from the
    /// current in-flight value keeps retriggered animations continuous.
    pub fn start(&mut self, key: AnimKey, from: f32, to: f32, duration: Duration, easing: Easing) {
        self.active.insert(
            key,
            Entry {
                from,
                to,
                started: Instant::now(),
                duration,
                easing,
                value: from,
            },
        );
    }

    /// Advance every active entry to `now`, dropping settled ones.
    /// Returns true while anything is still animating.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.active.retain(|_, entry| !entry.advance(now));
        !self.active.is_empty()
    }

    /// Current value for `key`, or `default` when nothing is tracked
    pub fn value(&self, key: AnimKey, default: f32) -> f32 {
        self.active.get(&key).map_or(default, |e| e.value)
    }

    pub fn is_active(&self, key: AnimKey) -> bool {
        self.active.contains_key(&key)
    }

    pub fn cancel(&mut self, key: AnimKey) {
        self.active.remove(&key);
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: AnimKey = (Subject::Item(7), Channel::HoverScale);

    #[test]
    fn cubic_ease_out_hits_endpoints() {
        assert_eq!(Easing::CubicEaseOut.apply(0.0), 0.0);
        assert_eq!(Easing::CubicEaseOut.apply(1.0), 1.0);
        // Out of range input clamps
        assert_eq!(Easing::CubicEaseOut.apply(2.0), 1.0);
        assert_eq!(Easing::CubicEaseOut.apply(-1.0), 0.0);
    }

    #[test]
    fn cubic_ease_out_front_loads_motion() {
        assert!(Easing::CubicEaseOut.apply(0.5) > 0.5);
    }

    #[test]
    fn entry_settles_and_is_removed() {
        let mut sched = AnimationScheduler::new();
        sched.start(KEY, 1.0, 2.0, Duration::from_millis(50), Easing::Linear);
        assert!(!sched.is_idle());

        let end = Instant::now() + Duration::from_millis(60);
        let still_active = sched.tick(end);
        assert!(!still_active);
        assert!(sched.is_idle());
        // Settled value falls back to the caller default
        assert_eq!(sched.value(KEY, 2.0), 2.0);
    }

    #[test]
    fn final_value_is_exact_target() {
        let mut sched = AnimationScheduler::new();
        sched.start(KEY, 0.0, 137.0, Duration::from_millis(10), Easing::CubicEaseOut);
        let mut last = 0.0;
        let start = Instant::now();
        for step in 1..=20 {
            let now = start + Duration::from_millis(step);
            sched.tick(now);
            last = sched.value(KEY, 137.0);
        }
        assert_eq!(last, 137.0);
    }

    #[test]
    fn value_stays_within_bounds_and_is_monotone_toward_target() {
        let mut sched = AnimationScheduler::new();
        sched.start(KEY, 1.0, 1.25, Duration::from_millis(100), Easing::CubicEaseOut);
        let start = Instant::now();
        let mut prev = 1.0f32;
        for step in 1..=12 {
            let now = start + Duration::from_millis(step * 10);
            sched.tick(now);
            let v = sched.value(KEY, 1.25);
            assert!(v >= prev - anim::EPSILON, "scale moved away from target");
            assert!((1.0..=1.25).contains(&v), "scale left its bounds: {v}");
            prev = v;
        }
        assert!((prev - 1.25).abs() < anim::EPSILON);
    }

    #[test]
    fn zero_duration_settles_on_first_tick() {
        let mut sched = AnimationScheduler::new();
        sched.start(KEY, 5.0, 9.0, Duration::ZERO, Easing::Linear);
        assert!(!sched.tick(Instant::now()));
        assert_eq!(sched.value(KEY, 9.0), 9.0);
    }

    #[test]
    fn retarget_replaces_entry() {
        let mut sched = AnimationScheduler::new();
        sched.start(KEY, 1.0, 2.0, Duration::from_secs(5), Easing::Linear);
        sched.tick(Instant::now());
        let mid = sched.value(KEY, 1.0);
        sched.start(KEY, mid, 1.0, Duration::from_secs(5), Easing::Linear);
        sched.tick(Instant::now());
        // Still one active entry, heading back down
        assert!(!sched.is_idle());
        assert!(sched.value(KEY, 1.0) <= mid + anim::EPSILON);
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let mut sched = AnimationScheduler::new();
        let other = (Subject::Panel, Channel::DockX);
        sched.start(KEY, 0.0, 1.0, Duration::from_secs(1), Easing::Linear);
        sched.start(other, 100.0, 0.0, Duration::ZERO, Easing::Linear);
        sched.tick(Instant::now());
        assert!(sched.is_active(KEY));
        assert!(!sched.is_active(other));
    }
}
