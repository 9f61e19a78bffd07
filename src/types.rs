use serde::{Deserialize, Serialize};

/// Screen-space position in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

impl Position {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u16,
    pub height: u16,
}

impl Dimensions {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in screen or panel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> i16 {
        self.x
    }

    pub fn right(&self) -> i16 {
        self.x + self.width as i16
    }

    pub fn top(&self) -> i16 {
        self.y
    }

    pub fn bottom(&self) -> i16 {
        self.y + self.height as i16
    }

    pub fn contains(&self, x: i16, y: i16) -> bool {
        x >= self.left() && x < self.right() && y >= self.top() && y < self.bottom()
    }
}

/// Screen edge the panel is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Default for Side {
    fn default() -> Self {
        Side::Right
    }
}
