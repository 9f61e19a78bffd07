//! Application-wide constants
//!
//! Magic numbers and string literals used throughout the application,
//! providing a single source of truth for constant values.

/// X11 protocol and rendering constants
pub mod x11 {
    /// ARGB color depth (32-bit: 8 bits each for Alpha, Red, Green, Blue)
    pub const ARGB_DEPTH: u8 = 32;

    /// Override redirect flag for unmanaged windows
    pub const OVERRIDE_REDIRECT: u32 = 1;
}

/// Mouse button constants
pub mod mouse {
    /// Left mouse button number
    pub const BUTTON_LEFT: u8 = 1;

    /// Middle mouse button number
    pub const BUTTON_MIDDLE: u8 = 2;

    /// Right mouse button number
    pub const BUTTON_RIGHT: u8 = 3;

    /// Scroll wheel up / down button numbers
    pub const BUTTON_SCROLL_UP: u8 = 4;
    pub const BUTTON_SCROLL_DOWN: u8 = 5;

    /// Press and release within this radius counts as a click, not a drag
    pub const CLICK_SLOP: i16 = 4;
}

/// Animation timing
pub mod anim {
    use std::time::Duration;

    /// Target tick interval (~60 Hz)
    pub const TICK_INTERVAL: Duration = Duration::from_millis(16);

    /// Hover scale animation duration
    pub const HOVER_DURATION: Duration = Duration::from_millis(120);

    /// Dock snap animation duration (fixed step count at the tick rate)
    pub const SNAP_STEPS: u32 = 12;

    /// Per-tick exponential smoothing rate for auto-hide width
    pub const AUTOHIDE_RATE: f32 = 0.35;

    /// Width within this distance of its target snaps exactly
    pub const AUTOHIDE_SNAP: f32 = 1.5;

    /// Scale applied to a hovered item icon
    pub const HOVER_TARGET_SCALE: f32 = 1.25;

    /// Settled-animation removal epsilon
    pub const EPSILON: f32 = 0.001;
}

/// Panel chrome geometry
pub mod panel {
    /// Corner radius of the rounded body
    pub const CORNER_RADIUS: u16 = 12;

    /// Number of stacked shadow layers drawn outside the body
    pub const SHADOW_LAYERS: u16 = 6;

    /// Margin reserved around the body for the shadow, in pixels
    pub const SHADOW_MARGIN: u16 = 8;

    /// Body fill alpha (0-255)
    pub const FILL_ALPHA: u8 = 64;

    /// Width of the screen-edge strip that re-expands a collapsed panel
    pub const EDGE_STRIP_WIDTH: u16 = 4;

    /// Dock snap decision threshold in pixels
    pub const SNAP_THRESHOLD: i16 = 50;

    /// Height of the category bar in the grid overlay
    pub const CATEGORY_BAR_HEIGHT: u16 = 26;

    /// Side of the square lock-toggle control
    pub const LOCK_TOGGLE_SIZE: u16 = 14;

    /// Scrollbar thumb width
    pub const SCROLLBAR_WIDTH: u16 = 5;
}

/// Item grid defaults
pub mod grid {
    /// Icon cell side in pixels
    pub const ITEM_SIZE: u16 = 40;

    /// Horizontal gap between cells
    pub const SPACING: u16 = 10;

    /// Row height including the two-line label area
    pub const ROW_HEIGHT: u16 = 68;

    /// Vertical gap between rows
    pub const ROW_GAP: u16 = 6;

    /// Maximum content height before scrolling kicks in
    pub const CAP_HEIGHT: u16 = 420;

    /// Minimum panel content height with no items
    pub const MIN_HEIGHT: u16 = 90;
}

/// Input/deactivation timing
pub mod timing {
    use std::time::Duration;

    /// Delay before a tooltip is shown for a hovered item
    pub const TOOLTIP_DELAY: Duration = Duration::from_millis(600);

    /// How long the external-drop poll runs after focus loss with a held button
    pub const DROP_POLL_WINDOW: Duration = Duration::from_millis(1500);

    /// Toast notification lifetime
    pub const TOAST_LIFETIME: Duration = Duration::from_millis(2500);
}

/// Remote client behavior
pub mod remote {
    use std::time::Duration;

    /// Maximum attempts for timeout/connect-class failures
    pub const MAX_ATTEMPTS: u32 = 3;

    /// First retry delay; doubles on each subsequent retry
    pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

    /// Per-request timeout
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Config file locations and limits
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "sidedock";

    /// Main settings file
    pub const FILENAME: &str = "sidedock.toml";

    /// Category every install starts with; cannot be renamed or deleted
    pub const RESERVED_CATEGORY: &str = "Main";

    pub const MAX_CORNER_RADIUS: u16 = 64;
    pub const MAX_SHADOW_MARGIN: u16 = 32;
    pub const MIN_ITEM_SIZE: u16 = 16;
    pub const MAX_ITEM_SIZE: u16 = 128;
}

/// Input device access for global hotkeys
pub mod input {
    /// evdev event value for a key press (1 = press, 0 = release, 2 = repeat)
    pub const KEY_PRESS: i32 = 1;

    pub const DEV_INPUT: &str = "/dev/input";

    /// Group membership required to read input devices
    pub const INPUT_GROUP: &str = "input";

    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}
