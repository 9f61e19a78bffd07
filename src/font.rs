//! TrueType text rendering using fontdue (pure Rust), plus the label
//! line-breaking used for item captions.

use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::fs;
use std::path::PathBuf;

/// Rendered text as ARGB bitmap (premultiplied alpha)
pub struct RenderedText {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>,
}

pub struct FontRenderer {
    font: Font,
    size: f32,
}

impl FontRenderer {
    pub fn from_path(path: PathBuf, size: f32) -> Result<Self> {
        let font_data = fs::read(&path)
            .with_context(|| format!("Failed to read font file: {}", path.display()))?;
        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font, size })
    }

    /// Try to find and load a common system font
    pub fn from_system_font(size: f32) -> Result<Self> {
        const FONT_PATH: Option<&str> = option_env!("FONT_PATH");
        if let Some(path) = FONT_PATH
            && let Ok(renderer) = Self::from_path(PathBuf::from(path), size)
        {
            return Ok(renderer);
        }

        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
        ];
        for path in &font_paths {
            if let Ok(renderer) = Self::from_path(PathBuf::from(path), size) {
                return Ok(renderer);
            }
        }

        Err(anyhow::anyhow!(
            "Could not find any system fonts. Tried FONT_PATH ({:?}) and hardcoded paths: {:?}",
            FONT_PATH,
            font_paths
        ))
    }

    /// Horizontal advance of `text` at the renderer's size
    pub fn measure(&self, text: &str) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, self.size).advance_width)
            .sum()
    }

    pub fn advance_of(&self, ch: char) -> f32 {
        self.font.metrics(ch, self.size).advance_width
    }

    /// Break an item label into at most two lines fitting `max_width`
    pub fn wrap_label(&self, text: &str, max_width: f32) -> (String, Option<String>) {
        wrap_two_lines(text, max_width, |ch| self.advance_of(ch))
    }

    /// Render one line to an ARGB bitmap with the given foreground color
    /// (transparent background)
    pub fn render_text(&self, text: &str, fg_color: u32) -> Result<RenderedText> {
        if text.is_empty() {
            return Ok(RenderedText {
                width: 0,
                height: 0,
                data: Vec::new(),
            });
        }

        // Layout glyphs
        let mut glyphs = Vec::new();
        let mut x = 0.0f32;
        let mut max_ascent = 0i32;
        let mut max_descent = 0i32;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.size);
            let ascent = metrics.height as i32 + metrics.ymin;
            let descent = -metrics.ymin;
            max_ascent = max_ascent.max(ascent);
            max_descent = max_descent.max(descent);
            glyphs.push((x as i32, metrics, bitmap));
            x += metrics.advance_width;
        }

        let width = x.ceil() as usize;
        let height = (max_ascent + max_descent).max(0) as usize;
        if width == 0 || height == 0 {
            return Ok(RenderedText {
                width: 0,
                height: 0,
                data: Vec::new(),
            });
        }

        let mut data = vec![0x00000000u32; width * height];
        let fg_a = ((fg_color >> 24) & 0xFF) as f32 / 255.0;
        let fg_r = ((fg_color >> 16) & 0xFF) as f32 / 255.0;
        let fg_g = ((fg_color >> 8) & 0xFF) as f32 / 255.0;
        let fg_b = (fg_color & 0xFF) as f32 / 255.0;

        for (x_offset, metrics, bitmap) in glyphs {
            let baseline_y = max_ascent - (metrics.height as i32 + metrics.ymin);
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let px = x_offset + gx as i32;
                    let py = baseline_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }
                    let coverage = bitmap[gy * metrics.width + gx] as f32 / 255.0;
                    if coverage > 0.0 {
                        // Premultiply against glyph coverage
                        let alpha = (fg_a * coverage * 255.0) as u32;
                        let r = (fg_r * fg_a * coverage * 255.0) as u32;
                        let g = (fg_g * fg_a * coverage * 255.0) as u32;
                        let b = (fg_b * fg_a * coverage * 255.0) as u32;
                        data[(py as usize) * width + (px as usize)] =
                            (alpha << 24) | (r << 16) | (g << 8) | b;
                    }
                }
            }
        }

        Ok(RenderedText {
            width,
            height,
            data,
        })
    }
}

/// Longest prefix of `chars` whose advances sum to at most `max_width`
fn fitting_prefix(chars: &[char], max_width: f32, advance: &impl Fn(char) -> f32) -> usize {
    let mut used = 0.0;
    for (i, &ch) in chars.iter().enumerate() {
        used += advance(ch);
        if used > max_width {
            return i;
        }
    }
    chars.len()
}

/// Is `i` a good place to break, reading `chars[i]` as the first char of
/// the second line? Spaces, separator punctuation, and camelCase humps
/// all qualify.
fn is_break_point(chars: &[char], i: usize) -> bool {
    if i == 0 || i >= chars.len() {
        return false;
    }
    let prev = chars[i - 1];
    let cur = chars[i];
    prev.is_whitespace()
        || matches!(prev, '-' | '_' | '.' | '/')
        || (prev.is_lowercase() && cur.is_uppercase())
}

/// Break `text` into at most two lines of `max_width`. The break point is
/// searched backwards from the overflow position for a natural boundary;
/// a hard mid-word break is the fallback. An overlong second line is
/// ellipsized.
pub fn wrap_two_lines(
    text: &str,
    max_width: f32,
    advance: impl Fn(char) -> f32,
) -> (String, Option<String>) {
    let chars: Vec<char> = text.chars().collect();
    let fit = fitting_prefix(&chars, max_width, &advance);
    if fit >= chars.len() {
        return (text.to_string(), None);
    }
    if fit == 0 {
        // Column narrower than a single glyph; nothing sensible to draw
        return (String::new(), None);
    }

    let break_at = (1..=fit)
        .rev()
        .find(|&i| is_break_point(&chars, i))
        .unwrap_or(fit);

    let first: String = chars[..break_at].iter().collect();
    let rest: Vec<char> = chars[break_at..]
        .iter()
        .copied()
        .skip_while(|c| c.is_whitespace())
        .collect();
    if rest.is_empty() {
        return (first.trim_end().to_string(), None);
    }

    let second_fit = fitting_prefix(&rest, max_width, &advance);
    let second = if second_fit >= rest.len() {
        rest.iter().collect::<String>()
    } else {
        let ell = '\u{2026}';
        let keep = fitting_prefix(&rest, (max_width - advance(ell)).max(0.0), &advance);
        let mut s: String = rest[..keep].iter().collect();
        s.push(ell);
        s
    };
    (first.trim_end().to_string(), Some(second))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every glyph 10px wide keeps the math readable
    fn adv(_: char) -> f32 {
        10.0
    }

    #[test]
    fn short_label_stays_on_one_line() {
        assert_eq!(wrap_two_lines("Notes", 100.0, adv), ("Notes".into(), None));
    }

    #[test]
    fn breaks_at_space_before_overflow() {
        // 10 chars fit; the space after "Project" is the natural break
        let (a, b) = wrap_two_lines("Project Plan", 100.0, adv);
        assert_eq!(a, "Project");
        assert_eq!(b.as_deref(), Some("Plan"));
    }

    #[test]
    fn breaks_at_separator_punctuation() {
        let (a, b) = wrap_two_lines("backup_2024_full", 100.0, adv);
        assert_eq!(a, "backup_");
        assert_eq!(b.as_deref(), Some("2024_full"));
    }

    #[test]
    fn breaks_at_camel_case_hump() {
        let (a, b) = wrap_two_lines("quarterlyReport", 100.0, adv);
        assert_eq!(a, "quarterly");
        assert_eq!(b.as_deref(), Some("Report"));
    }

    #[test]
    fn hard_breaks_unbroken_runs() {
        let (a, b) = wrap_two_lines("aaaaaaaaaaaaaaa", 100.0, adv);
        assert_eq!(a, "aaaaaaaaaa");
        assert_eq!(b.as_deref(), Some("aaaaa"));
    }

    #[test]
    fn overlong_second_line_is_ellipsized() {
        let (a, b) = wrap_two_lines("aaaaaaaaaa bbbbbbbbbbbbbbbb", 100.0, adv);
        assert_eq!(a, "aaaaaaaaaa");
        let second = b.unwrap();
        assert!(second.ends_with('\u{2026}'));
        // Nine glyphs plus the ellipsis fill the column
        assert_eq!(second.chars().count(), 10);
    }

    #[test]
    fn degenerate_column_renders_nothing() {
        assert_eq!(wrap_two_lines("abc", 5.0, adv), (String::new(), None));
    }
}
