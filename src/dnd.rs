//! XDND drop target support (protocol version 5, text/uri-list only).
//!
//! The shell advertises each overlay window as a drop target, accepts
//! position updates, and converts the drop selection into local paths.
//! Enter/leave also feed the focus-loss drop poll in `input`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

const XDND_VERSION: u32 = 5;

/// What the shell needs to know about an in-flight external drag
#[derive(Debug)]
pub enum DndSignal {
    Entered,
    Left,
    Dropped(Vec<PathBuf>),
}

pub struct DndState {
    xdnd_aware: Atom,
    xdnd_enter: Atom,
    xdnd_position: Atom,
    xdnd_status: Atom,
    xdnd_leave: Atom,
    xdnd_drop: Atom,
    xdnd_finished: Atom,
    xdnd_selection: Atom,
    xdnd_action_copy: Atom,
    uri_list: Atom,
    transfer_property: Atom,
    /// Source window of the drag currently over one of our windows
    source: Option<Window>,
    /// Our window the drag is over; the drop lands here
    target: Option<Window>,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .with_context(|| format!("Failed to intern {name} atom"))?
        .reply()
        .with_context(|| format!("Failed to get reply for {name} atom"))?
        .atom)
}

impl DndState {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        Ok(Self {
            xdnd_aware: intern(conn, "XdndAware")?,
            xdnd_enter: intern(conn, "XdndEnter")?,
            xdnd_position: intern(conn, "XdndPosition")?,
            xdnd_status: intern(conn, "XdndStatus")?,
            xdnd_leave: intern(conn, "XdndLeave")?,
            xdnd_drop: intern(conn, "XdndDrop")?,
            xdnd_finished: intern(conn, "XdndFinished")?,
            xdnd_selection: intern(conn, "XdndSelection")?,
            xdnd_action_copy: intern(conn, "XdndActionCopy")?,
            uri_list: intern(conn, "text/uri-list")?,
            transfer_property: intern(conn, "SIDEDOCK_DND")?,
            source: None,
            target: None,
        })
    }

    /// Mark a window as an XDND drop target
    pub fn advertise(&self, conn: &RustConnection, window: Window) -> Result<()> {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self.xdnd_aware,
            AtomEnum::ATOM,
            &[XDND_VERSION],
        )
        .context("Failed to set XdndAware")?;
        Ok(())
    }

    fn send_status(&self, conn: &RustConnection, our_window: Window, source: Window) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            source,
            self.xdnd_status,
            // Accept, no rectangle restriction, copy action
            [our_window, 1, 0, 0, self.xdnd_action_copy],
        );
        conn.send_event(false, source, EventMask::NO_EVENT, event)
            .context("Failed to send XdndStatus")?;
        conn.flush().context("Failed to flush XdndStatus")?;
        Ok(())
    }

    fn send_finished(&self, conn: &RustConnection, our_window: Window, source: Window) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            source,
            self.xdnd_finished,
            [our_window, 1, self.xdnd_action_copy, 0, 0],
        );
        conn.send_event(false, source, EventMask::NO_EVENT, event)
            .context("Failed to send XdndFinished")?;
        conn.flush().context("Failed to flush XdndFinished")?;
        Ok(())
    }

    /// Feed one X event through; Some(signal) when it advanced a drag
    pub fn handle_event(
        &mut self,
        conn: &RustConnection,
        event: &Event,
    ) -> Result<Option<DndSignal>> {
        match event {
            Event::ClientMessage(ev) => {
                let data = ev.data.as_data32();
                if ev.type_ == self.xdnd_enter {
                    debug!(source = data[0], "external drag entered");
                    self.source = Some(data[0]);
                    self.target = Some(ev.window);
                    Ok(Some(DndSignal::Entered))
                } else if ev.type_ == self.xdnd_position {
                    if let Some(source) = self.source {
                        self.target = Some(ev.window);
                        self.send_status(conn, ev.window, source)?;
                    }
                    Ok(None)
                } else if ev.type_ == self.xdnd_leave {
                    self.source = None;
                    self.target = None;
                    Ok(Some(DndSignal::Left))
                } else if ev.type_ == self.xdnd_drop {
                    let timestamp = data[2];
                    conn.convert_selection(
                        ev.window,
                        self.xdnd_selection,
                        self.uri_list,
                        self.transfer_property,
                        timestamp,
                    )
                    .context("Failed to request drop selection")?;
                    conn.flush().context("Failed to flush selection request")?;
                    Ok(None)
                } else {
                    Ok(None)
                }
            }
            Event::SelectionNotify(ev) => {
                if ev.selection != self.xdnd_selection {
                    return Ok(None);
                }
                let source = self.source.take();
                let target = self.target.take();
                if ev.property == x11rb::NONE {
                    warn!("drop selection conversion failed");
                    return Ok(Some(DndSignal::Left));
                }
                let reply = conn
                    .get_property(
                        true,
                        ev.requestor,
                        ev.property,
                        AtomEnum::ANY,
                        0,
                        u32::MAX,
                    )
                    .context("Failed to fetch drop data")?
                    .reply()
                    .context("Failed to read drop data")?;
                if let (Some(source), Some(target)) = (source, target) {
                    if let Err(e) = self.send_finished(conn, target, source) {
                        warn!(error = ?e, "failed to acknowledge drop");
                    }
                }
                let paths = parse_uri_list(&reply.value);
                debug!(count = paths.len(), "drop received");
                Ok(Some(DndSignal::Dropped(paths)))
            }
            _ => Ok(None),
        }
    }
}

/// Decode a text/uri-list payload into local file paths
fn parse_uri_list(data: &[u8]) -> Vec<PathBuf> {
    let text = String::from_utf8_lossy(data);
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let rest = line.strip_prefix("file://")?;
            // Strip an optional hostname before the path
            let path = match rest.find('/') {
                Some(0) => rest,
                Some(idx) => &rest[idx..],
                None => return None,
            };
            Some(PathBuf::from(percent_decode(path)))
        })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(value) =
                u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16)
            {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_list_parses_plain_paths() {
        let data = b"file:///home/u/report.pdf\r\nfile:///tmp/shot.png\r\n";
        let paths = parse_uri_list(data);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/home/u/report.pdf"),
                PathBuf::from("/tmp/shot.png")
            ]
        );
    }

    #[test]
    fn uri_list_skips_comments_and_foreign_schemes() {
        let data = b"# dropped from browser\nhttps://example.com/x\nfile:///ok\n";
        assert_eq!(parse_uri_list(data), vec![PathBuf::from("/ok")]);
    }

    #[test]
    fn hostname_prefix_is_stripped() {
        let data = b"file://localhost/srv/data\n";
        assert_eq!(parse_uri_list(data), vec![PathBuf::from("/srv/data")]);
    }

    #[test]
    fn percent_escapes_decode() {
        let data = b"file:///home/u/Project%20Plan.txt\n";
        assert_eq!(
            parse_uri_list(data),
            vec![PathBuf::from("/home/u/Project Plan.txt")]
        );
    }

    #[test]
    fn malformed_escape_passes_through() {
        assert_eq!(percent_decode("a%zz"), "a%zz");
        assert_eq!(percent_decode("trailing%2"), "trailing%2");
    }
}
