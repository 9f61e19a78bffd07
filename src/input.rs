//! Pointer routing: hit-test priority, click-vs-drag disambiguation,
//! tooltip delay, and the focus-loss drop poll.

use std::time::Instant;

use crate::constants::{mouse, timing};
use crate::layout::{self, GridMetrics, ScrollState};
use crate::types::{Position, Rect, Side};

/// What a pointer position lands on, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    LockToggle,
    Category(usize),
    Item(u32),
    /// Non-interactive panel area; pointer-down here starts a window drag
    Chrome,
    Outside,
}

/// Inputs for one grid-overlay hit test, all geometry from `layout`
pub struct GridHitContext<'a> {
    pub body: Rect,
    pub side: Side,
    pub category_bar: Rect,
    pub category_count: usize,
    pub metrics: &'a GridMetrics,
    pub item_ids: &'a [u32],
    pub scroll: &'a ScrollState,
    /// Item hit-tests are suppressed while the panel itself is dragged
    pub dragging: bool,
}

/// Priority: lock toggle, then category buttons, then items, then chrome
pub fn hit_test_grid(ctx: &GridHitContext<'_>, x: i16, y: i16) -> HitTarget {
    if !ctx.body.contains(x, y) {
        return HitTarget::Outside;
    }
    if layout::lock_toggle_rect(ctx.body, ctx.side).contains(x, y) {
        return HitTarget::LockToggle;
    }
    if let Some(i) = layout::hit_category(ctx.category_bar, ctx.category_count, x, y) {
        return HitTarget::Category(i);
    }
    if !ctx.dragging
        && let Some(i) = ctx
            .metrics
            .hit_item(ctx.item_ids.len(), ctx.scroll.offset(), x, y)
    {
        return HitTarget::Item(ctx.item_ids[i]);
    }
    HitTarget::Chrome
}

/// Press/release pairing with a slop radius: a release within
/// `CLICK_SLOP` of its press is a click, anything farther is a drag.
#[derive(Debug, Default)]
pub struct PressTracker {
    press: Option<(Position, HitTarget)>,
}

impl PressTracker {
    pub fn press(&mut self, at: Position, target: HitTarget) {
        self.press = Some((at, target));
    }

    pub fn pressed_target(&self) -> Option<HitTarget> {
        self.press.map(|(_, t)| t)
    }

    /// Consume the press; Some(target) when this release is a click
    pub fn release(&mut self, at: Position) -> Option<HitTarget> {
        let (start, target) = self.press.take()?;
        let within_slop = (at.x - start.x).abs() <= mouse::CLICK_SLOP
            && (at.y - start.y).abs() <= mouse::CLICK_SLOP;
        within_slop.then_some(target)
    }

    pub fn clear(&mut self) {
        self.press = None;
    }
}

/// Delayed tooltip: restarted on every hover change, fires once
#[derive(Debug, Default)]
pub struct TooltipTimer {
    pending: Option<(u32, Instant)>,
}

impl TooltipTimer {
    pub fn hover_changed(&mut self, id: Option<u32>, now: Instant) {
        self.pending = id.map(|id| (id, now + timing::TOOLTIP_DELAY));
    }

    /// The item whose tooltip should appear now, at most once per hover
    pub fn due(&mut self, now: Instant) -> Option<u32> {
        match self.pending {
            Some((id, at)) if now >= at => {
                self.pending = None;
                Some(id)
            }
            _ => None,
        }
    }
}

/// Focus loss while a mouse button is held may be an external
/// drag-and-drop in progress. Poll until either a drag signal arrives
/// (keep the window open) or the button is released without one (close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationOutcome {
    Pending,
    KeepOpen,
    Close,
}

#[derive(Debug, Default)]
pub struct DeactivationPoll {
    deadline: Option<Instant>,
    drag_seen: bool,
}

impl DeactivationPoll {
    /// Focus left the window. Returns the immediate outcome.
    pub fn focus_lost(&mut self, button_held: bool, now: Instant) -> DeactivationOutcome {
        if !button_held {
            return DeactivationOutcome::Close;
        }
        self.deadline = Some(now + timing::DROP_POLL_WINDOW);
        self.drag_seen = false;
        DeactivationOutcome::Pending
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// An external drag-enter/drop signal arrived
    pub fn drag_signal(&mut self) {
        if self.deadline.is_some() {
            self.drag_seen = true;
        }
    }

    pub fn poll(&mut self, button_held: bool, now: Instant) -> DeactivationOutcome {
        let Some(deadline) = self.deadline else {
            return DeactivationOutcome::Pending;
        };
        if self.drag_seen {
            self.deadline = None;
            return DeactivationOutcome::KeepOpen;
        }
        if !button_held || now >= deadline {
            self.deadline = None;
            return DeactivationOutcome::Close;
        }
        DeactivationOutcome::Pending
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.drag_seen = false;
    }
}
