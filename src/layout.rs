//! Pure geometry shared by drawing and hit-testing.
//!
//! Every rectangle the compositor paints and every rectangle the input
//! router tests comes out of this module, so the two can never disagree.

use crate::constants::panel;
use crate::types::{Dimensions, Position, Rect, Side};

/// Immutable inputs for item grid placement
#[derive(Debug, Clone, Copy)]
pub struct GridMetrics {
    /// Top-left of the first cell, in panel coordinates
    pub origin: Position,
    /// Width available for cells (panel content width)
    pub avail_width: u16,
    pub item_size: u16,
    pub spacing: u16,
    pub row_height: u16,
    pub row_gap: u16,
    /// Maximum content height before scrolling kicks in
    pub cap_height: u16,
    /// Content height used when there are no rows at all
    pub min_height: u16,
}

impl GridMetrics {
    pub fn items_per_row(&self) -> usize {
        let cell = self.item_size as u32 + self.spacing as u32;
        let avail = self.avail_width as u32 + self.spacing as u32;
        ((avail / cell) as usize).max(1)
    }

    /// Cell rectangle for item `index`, shifted up by `scroll`
    pub fn item_rect(&self, index: usize, scroll: u16) -> Rect {
        let per_row = self.items_per_row();
        let row = index / per_row;
        let col = index % per_row;
        let x = self.origin.x as i32 + col as i32 * (self.item_size as i32 + self.spacing as i32);
        let y = self.origin.y as i32 + row as i32 * (self.row_height as i32 + self.row_gap as i32)
            - scroll as i32;
        Rect::new(x as i16, y as i16, self.item_size, self.row_height)
    }

    fn rows(&self, count: usize) -> usize {
        count.div_ceil(self.items_per_row())
    }

    /// Unclamped height the grid needs for `count` items
    pub fn required_height(&self, count: usize) -> u16 {
        let rows = self.rows(count);
        if rows == 0 {
            return 0;
        }
        (rows as u32 * self.row_height as u32 + (rows as u32 - 1) * self.row_gap as u32)
            .min(u16::MAX as u32) as u16
    }

    /// Visible content height: required, clamped to [min_height, cap_height]
    pub fn content_height(&self, count: usize) -> u16 {
        self.required_height(count)
            .clamp(self.min_height, self.cap_height)
    }

    /// Zero unless the required height exceeds the cap
    pub fn max_scroll(&self, count: usize) -> u16 {
        let required = self.required_height(count);
        required.saturating_sub(self.cap_height)
    }

    /// Inverse of `item_rect`: which item cell, if any, covers (x, y).
    /// Walks the same rectangles the compositor draws.
    pub fn hit_item(&self, count: usize, scroll: u16, x: i16, y: i16) -> Option<usize> {
        (0..count).find(|&i| self.item_rect(i, scroll).contains(x, y))
    }
}

/// Clamped scroll offset state
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollState {
    offset: u16,
    max_offset: u16,
}

impl ScrollState {
    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn max_offset(&self) -> u16 {
        self.max_offset
    }

    /// Re-derive the limit after a content or cap change, re-clamping offset
    pub fn set_max(&mut self, max_offset: u16) {
        self.max_offset = max_offset;
        self.offset = self.offset.min(max_offset);
    }

    pub fn scroll_by(&mut self, delta: i32) {
        let next = (self.offset as i32 + delta).clamp(0, self.max_offset as i32);
        self.offset = next as u16;
    }
}

/// Width left for cells after reserving the scrollbar gutter on the right
pub fn grid_avail_width(area_width: u16, spacing: u16) -> u16 {
    area_width.saturating_sub(panel::SCROLLBAR_WIDTH + spacing)
}

/// Panel body rectangle of a window of `size`, inset by the shadow margin
pub fn overlay_body(size: Dimensions, margin: u16) -> Rect {
    Rect::new(
        margin as i16,
        margin as i16,
        size.width.saturating_sub(margin * 2),
        size.height.saturating_sub(margin * 2),
    )
}

/// Category-bar strip across the top of the grid body
pub fn category_strip(body: Rect, spacing: u16) -> Rect {
    Rect::new(
        body.x + spacing as i16,
        body.y + 4,
        body.width.saturating_sub(spacing * 2),
        panel::CATEGORY_BAR_HEIGHT - 8,
    )
}

/// Evenly divided category-bar button rectangle
pub fn category_rect(bar: Rect, index: usize, count: usize) -> Rect {
    debug_assert!(count > 0 && index < count);
    let w = bar.width as i32 / count as i32;
    let x = bar.x as i32 + index as i32 * w;
    // Last button absorbs the integer-division remainder
    let width = if index + 1 == count {
        bar.x as i32 + bar.width as i32 - x
    } else {
        w
    };
    Rect::new(x as i16, bar.y, width.max(0) as u16, bar.height)
}

pub fn hit_category(bar: Rect, count: usize, x: i16, y: i16) -> Option<usize> {
    if count == 0 {
        return None;
    }
    (0..count).find(|&i| category_rect(bar, i, count).contains(x, y))
}

/// Scrollbar thumb along the right edge of `track`; None when nothing scrolls
pub fn scrollbar_thumb(track: Rect, required_height: u16, scroll: &ScrollState) -> Option<Rect> {
    if scroll.max_offset() == 0 || required_height == 0 {
        return None;
    }
    let track_h = track.height as f32;
    let visible_frac = track.height as f32 / required_height as f32;
    let thumb_h = (track_h * visible_frac).max(12.0).min(track_h);
    let travel = track_h - thumb_h;
    let pos_frac = scroll.offset() as f32 / scroll.max_offset() as f32;
    let y = track.y as f32 + travel * pos_frac;
    Some(Rect::new(
        track.right() - panel::SCROLLBAR_WIDTH as i16,
        y.round() as i16,
        panel::SCROLLBAR_WIDTH,
        thumb_h.round() as u16,
    ))
}

/// Lock-toggle control in the top corner opposite the docked edge
pub fn lock_toggle_rect(content: Rect, side: Side) -> Rect {
    let size = panel::LOCK_TOGGLE_SIZE;
    let x = match side {
        Side::Left => content.right() - size as i16 - 4,
        Side::Right => content.x + 4,
    };
    Rect::new(x, content.y + 4, size, size)
}

/// Thin strip along the docked screen edge spanning the panel vertically.
/// Pointer presence here re-expands a collapsed panel.
pub fn edge_strip(side: Side, screen_width: u16, panel_y: i16, panel_height: u16) -> Rect {
    let w = panel::EDGE_STRIP_WIDTH;
    let x = match side {
        Side::Left => 0,
        Side::Right => screen_width as i16 - w as i16,
    };
    Rect::new(x, panel_y, w, panel_height)
}

/// Canonical docked x for a panel of `panel_width` (including shadow margin)
pub fn docked_x(side: Side, screen_width: u16, panel_width: u16, shadow_margin: u16) -> i16 {
    match side {
        // Visible body edge sits flush against the screen edge
        Side::Left => -(shadow_margin as i16),
        Side::Right => screen_width as i16 - panel_width as i16 + shadow_margin as i16,
    }
}

/// Clamp a dragged panel position to the screen working area
pub fn clamp_to_screen(
    x: i16,
    y: i16,
    panel_width: u16,
    panel_height: u16,
    screen_width: u16,
    screen_height: u16,
) -> Position {
    let max_x = (screen_width as i32 - panel_width as i32).max(0);
    let max_y = (screen_height as i32 - panel_height as i32).max(0);
    Position::new(
        (x as i32).clamp(0, max_x) as i16,
        (y as i32).clamp(0, max_y) as i16,
    )
}
