//! Software compositor for the overlay windows.
//!
//! Builds one premultiplied-ARGB frame per call: shadow stack, rounded
//! translucent body, chrome, icons, labels, scrollbar, toast. The buffer
//! is handed to `surface` for publication; nothing here touches X11.

use crate::constants::{anim, panel};
use crate::font::FontRenderer;
use crate::items::IconBitmap;
use crate::layout;
use crate::layout::ScrollState;
use crate::types::{Dimensions, Rect, Side};

pub mod color {
    /// Premultiplied ARGB helpers. All compositor colors are premultiplied
    /// so OVER blending is a single multiply-add per channel.
    pub fn premultiply(a: u8, r: u8, g: u8, b: u8) -> u32 {
        let af = a as u32;
        let pm = |c: u8| (c as u32 * af + 127) / 255;
        (af << 24) | (pm(r) << 16) | (pm(g) << 8) | pm(b)
    }

    pub const TEXT: u32 = 0xFFF0F0F0;
    pub const TEXT_DIM: u32 = 0xFFB8B8B8;

    pub fn body_fill(alpha: u8) -> u32 {
        premultiply(alpha, 30, 32, 38)
    }

    pub fn shadow_layer() -> u32 {
        premultiply(22, 0, 0, 0)
    }

    pub fn chrome_fill() -> u32 {
        premultiply(90, 255, 255, 255)
    }

    pub fn chrome_active() -> u32 {
        premultiply(160, 120, 170, 255)
    }

    pub fn toast_fill() -> u32 {
        premultiply(210, 20, 20, 24)
    }
}

/// One frame's pixel storage, premultiplied ARGB
pub struct FrameBuffer {
    pub width: u16,
    pub height: u16,
    pub data: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(size: Dimensions) -> Self {
        Self {
            width: size.width,
            height: size.height,
            data: vec![0; size.width as usize * size.height as usize],
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Source-over blend of a premultiplied pixel, `coverage` in [0, 1]
    fn blend(&mut self, x: i32, y: i32, src: u32, coverage: f32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 || coverage <= 0.0 {
            return;
        }
        let cov = coverage.min(1.0);
        let sa = (((src >> 24) & 0xFF) as f32 * cov) as u32;
        let sr = (((src >> 16) & 0xFF) as f32 * cov) as u32;
        let sg = (((src >> 8) & 0xFF) as f32 * cov) as u32;
        let sb = ((src & 0xFF) as f32 * cov) as u32;

        let idx = y as usize * self.width as usize + x as usize;
        let dst = self.data[idx];
        let da = (dst >> 24) & 0xFF;
        let dr = (dst >> 16) & 0xFF;
        let dg = (dst >> 8) & 0xFF;
        let db = dst & 0xFF;

        let inv = 255 - sa;
        let a = sa + da * inv / 255;
        let r = sr + dr * inv / 255;
        let g = sg + dg * inv / 255;
        let b = sb + db * inv / 255;
        self.data[idx] = (a.min(255) << 24) | (r.min(255) << 16) | (g.min(255) << 8) | b.min(255);
    }

    pub fn fill_rect(&mut self, rect: Rect, src: u32) {
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                self.blend(x as i32, y as i32, src, 1.0);
            }
        }
    }

    /// Antialiased rounded rectangle fill. Coverage comes from the distance
    /// to the nearest corner circle; straight edges are full coverage.
    pub fn fill_rounded_rect(&mut self, rect: Rect, radius: u16, src: u32) {
        let r = radius.min(rect.width / 2).min(rect.height / 2) as f32;
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                // Distance outside the corner circle, 0 on straight spans
                let cx = (rect.left() as f32 + r).max(px.min(rect.right() as f32 - r));
                let cy = (rect.top() as f32 + r).max(py.min(rect.bottom() as f32 - r));
                let dx = px - cx;
                let dy = py - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                let coverage = if dist == 0.0 {
                    1.0
                } else {
                    (r - dist + 0.5).clamp(0.0, 1.0)
                };
                self.blend(x as i32, y as i32, src, coverage);
            }
        }
    }

    /// Blit a premultiplied ARGB bitmap (e.g. rendered text) with OVER
    pub fn blit(&mut self, x: i16, y: i16, width: usize, height: usize, data: &[u32]) {
        for sy in 0..height {
            for sx in 0..width {
                let px = data[sy * width + sx];
                if px >> 24 != 0 {
                    self.blend(x as i32 + sx as i32, y as i32 + sy as i32, px, 1.0);
                }
            }
        }
    }

    /// Nearest-neighbour scaled blit, centered on `center`
    pub fn blit_scaled(&mut self, icon: &IconBitmap, center: (i16, i16), target_side: f32) {
        if icon.width == 0 || icon.height == 0 || target_side <= 0.0 {
            return;
        }
        let out = target_side.round() as i32;
        let x0 = center.0 as i32 - out / 2;
        let y0 = center.1 as i32 - out / 2;
        for oy in 0..out {
            for ox in 0..out {
                let sx = (ox as f32 / out as f32 * icon.width as f32) as usize;
                let sy = (oy as f32 / out as f32 * icon.height as f32) as usize;
                let px = icon.data[sy.min(icon.height - 1) * icon.width + sx.min(icon.width - 1)];
                if px >> 24 != 0 {
                    self.blend(x0 + ox, y0 + oy, px, 1.0);
                }
            }
        }
    }
}

/// Per-item visual state, geometry already resolved through `layout`
pub struct ItemVisual<'a> {
    pub rect: Rect,
    pub scale: f32,
    pub icon: &'a IconBitmap,
    pub label: &'a str,
}

/// Everything one frame of the grid overlay needs
pub struct GridScene<'a> {
    pub size: Dimensions,
    pub body: Rect,
    pub side: Side,
    pub fill_alpha: u8,
    pub corner_radius: u16,
    pub shadow_margin: u16,
    pub category_bar: Rect,
    pub categories: &'a [String],
    pub active_category: usize,
    pub items: &'a [ItemVisual<'a>],
    pub item_size: u16,
    pub grid_clip: Rect,
    pub required_height: u16,
    pub scroll: &'a ScrollState,
    pub locked: bool,
    pub toast: Option<&'a str>,
}

/// Everything one frame of the launcher bar needs
pub struct BarScene<'a> {
    pub size: Dimensions,
    pub body: Rect,
    pub side: Side,
    pub fill_alpha: u8,
    pub corner_radius: u16,
    pub shadow_margin: u16,
    pub items: &'a [ItemVisual<'a>],
    pub item_size: u16,
    pub locked: bool,
    pub toast: Option<&'a str>,
}

pub struct FrameCompositor {
    font: FontRenderer,
    label_font: FontRenderer,
}

impl FrameCompositor {
    pub fn new(font: FontRenderer, label_font: FontRenderer) -> Self {
        Self { font, label_font }
    }

    /// Stacked shadow layers then the translucent rounded body
    fn panel_chrome(
        &self,
        frame: &mut FrameBuffer,
        body: Rect,
        corner_radius: u16,
        shadow_margin: u16,
        fill_alpha: u8,
    ) {
        let layers = panel::SHADOW_LAYERS as i16;
        for i in 0..layers {
            // Outermost layer first and largest; stacking builds the falloff
            let expand = shadow_margin as i16 * (layers - i) / layers;
            let rect = Rect::new(
                body.x - expand,
                body.y - expand,
                (body.width as i16 + expand * 2) as u16,
                (body.height as i16 + expand * 2) as u16,
            );
            frame.fill_rounded_rect(rect, corner_radius + expand as u16, color::shadow_layer());
        }
        frame.fill_rounded_rect(body, corner_radius, color::body_fill(fill_alpha));
    }

    fn draw_item(&self, frame: &mut FrameBuffer, item: &ItemVisual<'_>, icon_side: u16, clip: Rect) {
        let rect = item.rect;
        if rect.bottom() <= clip.top() || rect.top() >= clip.bottom() {
            return;
        }
        let scale = item.scale.clamp(1.0, anim::HOVER_TARGET_SCALE);
        let center = (
            rect.x + rect.width as i16 / 2,
            rect.y + icon_side as i16 / 2,
        );
        frame.blit_scaled(item.icon, center, icon_side as f32 * scale);

        let label_width = rect.width as f32 + 8.0;
        let (first, second) = self.label_font.wrap_label(item.label, label_width);
        let mut ty = rect.y + icon_side as i16 + 2;
        for line in std::iter::once(first).chain(second) {
            if let Ok(text) = self.label_font.render_text(&line, color::TEXT) {
                let tx = rect.x + (rect.width as i16 - text.width as i16) / 2;
                frame.blit(tx, ty, text.width, text.height, &text.data);
                ty += text.height as i16 + 1;
            }
        }
    }

    fn draw_lock_toggle(&self, frame: &mut FrameBuffer, body: Rect, side: Side, locked: bool) {
        let rect = layout::lock_toggle_rect(body, side);
        let fill = if locked {
            color::chrome_active()
        } else {
            color::chrome_fill()
        };
        frame.fill_rounded_rect(rect, 3, fill);
    }

    fn draw_toast(&self, frame: &mut FrameBuffer, body: Rect, message: &str) {
        if let Ok(text) = self.font.render_text(message, color::TEXT) {
            let w = (text.width as u16 + 16).min(body.width);
            let h = text.height as u16 + 10;
            let rect = Rect::new(
                body.x + (body.width as i16 - w as i16) / 2,
                body.bottom() - h as i16 - 6,
                w,
                h,
            );
            frame.fill_rounded_rect(rect, 6, color::toast_fill());
            frame.blit(rect.x + 8, rect.y + 5, text.width, text.height, &text.data);
        }
    }

    /// Build one frame of the grid overlay
    pub fn render_grid(&self, scene: &GridScene<'_>) -> FrameBuffer {
        let mut frame = FrameBuffer::new(scene.size);
        self.panel_chrome(
            &mut frame,
            scene.body,
            scene.corner_radius,
            scene.shadow_margin,
            scene.fill_alpha,
        );

        // Category bar
        let count = scene.categories.len();
        for (i, name) in scene.categories.iter().enumerate() {
            let rect = layout::category_rect(scene.category_bar, i, count);
            let fill = if i == scene.active_category {
                color::chrome_active()
            } else {
                color::chrome_fill()
            };
            frame.fill_rounded_rect(
                Rect::new(rect.x + 1, rect.y, rect.width.saturating_sub(2), rect.height),
                4,
                fill,
            );
            if let Ok(text) = self.font.render_text(name, color::TEXT) {
                let tx = rect.x + (rect.width as i16 - text.width as i16) / 2;
                let ty = rect.y + (rect.height as i16 - text.height as i16) / 2;
                frame.blit(tx, ty, text.width, text.height, &text.data);
            }
        }

        for item in scene.items {
            self.draw_item(&mut frame, item, scene.item_size, scene.grid_clip);
        }

        if let Some(thumb) =
            layout::scrollbar_thumb(scene.grid_clip, scene.required_height, scene.scroll)
        {
            frame.fill_rounded_rect(thumb, 2, color::chrome_fill());
        }

        self.draw_lock_toggle(&mut frame, scene.body, scene.side, scene.locked);
        if let Some(message) = scene.toast {
            self.draw_toast(&mut frame, scene.body, message);
        }
        frame
    }

    /// Build one frame of the launcher bar
    pub fn render_bar(&self, scene: &BarScene<'_>) -> FrameBuffer {
        let mut frame = FrameBuffer::new(scene.size);
        self.panel_chrome(
            &mut frame,
            scene.body,
            scene.corner_radius,
            scene.shadow_margin,
            scene.fill_alpha,
        );
        for item in scene.items {
            self.draw_item(&mut frame, item, scene.item_size, scene.body);
        }
        self.draw_lock_toggle(&mut frame, scene.body, scene.side, scene.locked);
        if let Some(message) = scene.toast {
            self.draw_toast(&mut frame, scene.body, message);
        }
        frame
    }
}
