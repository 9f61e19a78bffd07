//! Per-pixel-alpha overlay windows.
//!
//! Wraps the X11 facility: a 32-bit ARGB visual, an override-redirect
//! always-on-top window, and whole-frame publication via PutImage. The
//! compositor never talks to X directly; it hands frames to this module.

use anyhow::{Context, Result};
use tracing::{error, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::compositor::FrameBuffer;
use crate::constants::x11 as x11c;
use crate::types::{Dimensions, Position};

/// Shared immutable X context
pub struct XContext<'a> {
    pub conn: &'a RustConnection,
    pub screen: &'a Screen,
}

/// Pre-cached atoms, interned once at startup
pub struct CachedAtoms {
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
    pub wm_class: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        Ok(Self {
            net_wm_state: conn
                .intern_atom(false, b"_NET_WM_STATE")
                .context("Failed to intern _NET_WM_STATE atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_STATE atom")?
                .atom,
            net_wm_state_above: conn
                .intern_atom(false, b"_NET_WM_STATE_ABOVE")
                .context("Failed to intern _NET_WM_STATE_ABOVE atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_STATE_ABOVE atom")?
                .atom,
            wm_class: conn
                .intern_atom(false, b"WM_CLASS")
                .context("Failed to intern WM_CLASS atom")?
                .reply()
                .context("Failed to get reply for WM_CLASS atom")?
                .atom,
        })
    }
}

/// Find the 32-bit ARGB visual for per-pixel transparency
fn find_argb_visual(screen: &Screen) -> Result<Visualid> {
    screen
        .allowed_depths
        .iter()
        .find(|d| d.depth == x11c::ARGB_DEPTH)
        .and_then(|d| d.visuals.first())
        .map(|v| v.visual_id)
        .context("No 32-bit ARGB visual available (is a compositor running?)")
}

/// One overlay window plus its publish resources
pub struct OverlaySurface {
    window: Window,
    gc: Gcontext,
    position: Position,
    size: Dimensions,
    mapped: bool,
}

impl OverlaySurface {
    pub fn create(
        ctx: &XContext<'_>,
        atoms: &CachedAtoms,
        position: Position,
        size: Dimensions,
    ) -> Result<Self> {
        let conn = ctx.conn;
        let visual = find_argb_visual(ctx.screen)?;

        let colormap = conn.generate_id().context("Failed to generate colormap ID")?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, ctx.screen.root, visual)
            .context("Failed to create ARGB colormap")?;

        let window = conn.generate_id().context("Failed to generate window ID")?;
        conn.create_window(
            x11c::ARGB_DEPTH,
            window,
            ctx.screen.root,
            position.x,
            position.y,
            size.width,
            size.height,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &CreateWindowAux::new()
                .background_pixel(0)
                .border_pixel(0)
                .colormap(colormap)
                .override_redirect(x11c::OVERRIDE_REDIRECT)
                .event_mask(
                    EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::POINTER_MOTION
                        | EventMask::FOCUS_CHANGE
                        | EventMask::EXPOSURE,
                ),
        )
        .context("Failed to create overlay window")?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            atoms.wm_class,
            AtomEnum::STRING,
            b"sidedock\0sidedock\0",
        )
        .context("Failed to set WM_CLASS")?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[atoms.net_wm_state_above],
        )
        .context("Failed to set window always-on-top")?;

        let gc = conn.generate_id().context("Failed to generate GC ID")?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .context("Failed to create graphics context")?;

        info!(window, x = position.x, y = position.y, width = size.width, height = size.height,
              "created overlay window");
        Ok(Self {
            window,
            gc,
            position,
            size,
            mapped: false,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn size(&self) -> Dimensions {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn set_mapped(&mut self, conn: &RustConnection, mapped: bool) -> Result<()> {
        if mapped == self.mapped {
            return Ok(());
        }
        self.mapped = mapped;
        if mapped {
            conn.map_window(self.window).context("Failed to map overlay window")?;
        } else {
            conn.unmap_window(self.window).context("Failed to unmap overlay window")?;
        }
        conn.flush().context("Failed to flush after map change")?;
        Ok(())
    }

    pub fn move_to(&mut self, conn: &RustConnection, position: Position) -> Result<()> {
        if position == self.position {
            return Ok(());
        }
        self.position = position;
        conn.configure_window(
            self.window,
            &ConfigureWindowAux::new()
                .x(position.x as i32)
                .y(position.y as i32),
        )
        .context("Failed to move overlay window")?;
        Ok(())
    }

    pub fn resize(&mut self, conn: &RustConnection, size: Dimensions) -> Result<()> {
        if size == self.size || size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.size = size;
        conn.configure_window(
            self.window,
            &ConfigureWindowAux::new()
                .width(size.width as u32)
                .height(size.height as u32),
        )
        .context("Failed to resize overlay window")?;
        Ok(())
    }

    /// Publish a whole frame. Synchronous and atomic from the caller's
    /// perspective; a no-op while the window is unmapped.
    pub fn publish(&self, conn: &RustConnection, frame: &FrameBuffer) -> Result<()> {
        if !self.mapped {
            return Ok(());
        }
        let width = frame.width.min(self.size.width);
        let height = frame.height.min(self.size.height);
        if width == 0 || height == 0 {
            return Ok(());
        }

        // Rows are uploaded in bands so a tall frame never exceeds the
        // request length limit.
        let band_rows = (65_000 / (width as usize * 4)).max(1) as u16;
        let mut y = 0u16;
        while y < height {
            let rows = band_rows.min(height - y);
            let mut bytes = Vec::with_capacity(width as usize * rows as usize * 4);
            for row in y..y + rows {
                let start = row as usize * frame.width as usize;
                for &pixel in &frame.data[start..start + width as usize] {
                    // X11 native little-endian BGRA
                    bytes.push(pixel as u8);
                    bytes.push((pixel >> 8) as u8);
                    bytes.push((pixel >> 16) as u8);
                    bytes.push((pixel >> 24) as u8);
                }
            }
            conn.put_image(
                ImageFormat::Z_PIXMAP,
                self.window,
                self.gc,
                width,
                rows,
                0,
                y as i16,
                0,
                x11c::ARGB_DEPTH,
                &bytes,
            )
            .context("Failed to upload frame band")?;
            y += rows;
        }
        conn.flush().context("Failed to flush after frame publish")?;
        Ok(())
    }

    pub fn destroy(&self, conn: &RustConnection) {
        if let Err(e) = conn.free_gc(self.gc) {
            error!("Failed to free GC {}: {}", self.gc, e);
        }
        if let Err(e) = conn.destroy_window(self.window) {
            error!("Failed to destroy window {}: {}", self.window, e);
        }
        let _ = conn.flush();
    }
}

/// Global pointer position plus whether any button is held
pub fn query_pointer(ctx: &XContext<'_>) -> Result<(Position, bool)> {
    let reply = ctx
        .conn
        .query_pointer(ctx.screen.root)
        .context("Failed to send pointer query")?
        .reply()
        .context("Failed to get pointer query reply")?;
    let buttons = reply.mask.intersects(
        KeyButMask::BUTTON1 | KeyButMask::BUTTON2 | KeyButMask::BUTTON3,
    );
    Ok((Position::new(reply.root_x, reply.root_y), buttons))
}
