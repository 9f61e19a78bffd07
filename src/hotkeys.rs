//! Global hotkeys via evdev: one listener thread per keyboard device,
//! sending the bound tool's name over a channel when its combination
//! fires. Missing /dev/input permissions degrade to a warning; the
//! overlay itself is unaffected.

use anyhow::{Context, Result};
use evdev::{Device, EventType, InputEventKind, Key};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::config::KeyCombo;
use crate::constants::input;

/// A combo resolved to evdev key codes, ready for matching
#[derive(Debug, Clone)]
struct ResolvedBinding {
    tool: String,
    key: Key,
    ctrl: bool,
    alt: bool,
    shift: bool,
}

/// Translate a persisted key name to its evdev code
fn parse_key_name(name: &str) -> Option<Key> {
    let upper = name.to_uppercase();
    let key = match upper.as_str() {
        "A" => Key::KEY_A,
        "B" => Key::KEY_B,
        "C" => Key::KEY_C,
        "D" => Key::KEY_D,
        "E" => Key::KEY_E,
        "F" => Key::KEY_F,
        "G" => Key::KEY_G,
        "H" => Key::KEY_H,
        "I" => Key::KEY_I,
        "J" => Key::KEY_J,
        "K" => Key::KEY_K,
        "L" => Key::KEY_L,
        "M" => Key::KEY_M,
        "N" => Key::KEY_N,
        "O" => Key::KEY_O,
        "P" => Key::KEY_P,
        "Q" => Key::KEY_Q,
        "R" => Key::KEY_R,
        "S" => Key::KEY_S,
        "T" => Key::KEY_T,
        "U" => Key::KEY_U,
        "V" => Key::KEY_V,
        "W" => Key::KEY_W,
        "X" => Key::KEY_X,
        "Y" => Key::KEY_Y,
        "Z" => Key::KEY_Z,
        "0" => Key::KEY_0,
        "1" => Key::KEY_1,
        "2" => Key::KEY_2,
        "3" => Key::KEY_3,
        "4" => Key::KEY_4,
        "5" => Key::KEY_5,
        "6" => Key::KEY_6,
        "7" => Key::KEY_7,
        "8" => Key::KEY_8,
        "9" => Key::KEY_9,
        "F1" => Key::KEY_F1,
        "F2" => Key::KEY_F2,
        "F3" => Key::KEY_F3,
        "F4" => Key::KEY_F4,
        "F5" => Key::KEY_F5,
        "F6" => Key::KEY_F6,
        "F7" => Key::KEY_F7,
        "F8" => Key::KEY_F8,
        "F9" => Key::KEY_F9,
        "F10" => Key::KEY_F10,
        "F11" => Key::KEY_F11,
        "F12" => Key::KEY_F12,
        "TAB" => Key::KEY_TAB,
        "SPACE" => Key::KEY_SPACE,
        "ESCAPE" | "ESC" => Key::KEY_ESC,
        "HOME" => Key::KEY_HOME,
        "END" => Key::KEY_END,
        "INSERT" => Key::KEY_INSERT,
        "DELETE" => Key::KEY_DELETE,
        "PAUSE" => Key::KEY_PAUSE,
        "PRINT" | "PRINTSCREEN" => Key::KEY_SYSRQ,
        _ => return None,
    };
    Some(key)
}

fn resolve_bindings(bindings: &HashMap<String, KeyCombo>) -> Vec<ResolvedBinding> {
    let mut resolved = Vec::new();
    for (tool, combo) in bindings {
        match parse_key_name(&combo.key) {
            Some(key) => resolved.push(ResolvedBinding {
                tool: tool.clone(),
                key,
                ctrl: combo.ctrl,
                alt: combo.alt,
                shift: combo.shift,
            }),
            None => warn!(tool = %tool, key = %combo.key, "Unknown key name in hotkey binding, skipping"),
        }
    }
    resolved
}

/// Find all devices that look like keyboards (support the Tab key)
fn find_all_keyboard_devices() -> Result<Vec<Device>> {
    info!(path = %input::DEV_INPUT, "Scanning for keyboard devices...");

    let mut devices = Vec::new();
    for entry in std::fs::read_dir(input::DEV_INPUT).context(format!(
        "Failed to read {} - are you in the '{}' group?",
        input::DEV_INPUT,
        input::INPUT_GROUP
    ))? {
        let entry = entry?;
        let path = entry.path();
        if let Ok(device) = Device::open(&path) {
            if let Some(keys) = device.supported_keys() {
                if keys.contains(Key::KEY_TAB) {
                    info!(device_path = %path.display(), name = ?device.name(), "Found keyboard device");
                    devices.push(device);
                }
            }
        }
    }

    if devices.is_empty() {
        anyhow::bail!(
            "No keyboard device found. Ensure you're in '{}' group:\n\
             {}\n\
             Then log out and back in.",
            input::INPUT_GROUP,
            input::ADD_TO_INPUT_GROUP
        )
    }

    info!(count = devices.len(), "Listening on keyboard device(s)");
    Ok(devices)
}

/// Spawn one listener thread per keyboard device. The channel carries
/// the tool name of whichever binding fired.
pub fn spawn_listener(
    bindings: &HashMap<String, KeyCombo>,
    sender: Sender<String>,
) -> Result<Vec<thread::JoinHandle<()>>> {
    let resolved = Arc::new(resolve_bindings(bindings));
    if resolved.is_empty() {
        info!("No hotkey bindings configured, skipping listener");
        return Ok(Vec::new());
    }

    let devices = find_all_keyboard_devices()?;
    let mut handles = Vec::new();
    for device in devices {
        let sender = sender.clone();
        let resolved = Arc::clone(&resolved);
        let handle = thread::spawn(move || {
            info!(device = ?device.name(), "Hotkey listener started");
            if let Err(e) = listen_for_hotkeys(device, &resolved, sender) {
                error!(error = %e, "Hotkey listener error");
            }
        });
        handles.push(handle);
    }
    Ok(handles)
}

fn listen_for_hotkeys(
    mut device: Device,
    bindings: &[ResolvedBinding],
    sender: Sender<String>,
) -> Result<()> {
    loop {
        let events = device.fetch_events().context("Failed to fetch events")?;

        // Finish with the event iterator before querying key state
        let mut presses = Vec::new();
        for event in events {
            if event.event_type() != EventType::KEY {
                continue;
            }
            if let InputEventKind::Key(key) = event.kind() {
                debug!(key = ?key, value = event.value(), "Key event");
                if event.value() == input::KEY_PRESS {
                    presses.push(key);
                }
            }
        }

        for key in presses {
            // Real-time modifier state when the key went down; batched
            // modifier events would otherwise race the press.
            let state = device
                .get_key_state()
                .context("Failed to get keyboard state")?;
            let ctrl =
                state.contains(Key::KEY_LEFTCTRL) || state.contains(Key::KEY_RIGHTCTRL);
            let alt = state.contains(Key::KEY_LEFTALT) || state.contains(Key::KEY_RIGHTALT);
            let shift =
                state.contains(Key::KEY_LEFTSHIFT) || state.contains(Key::KEY_RIGHTSHIFT);

            for binding in bindings {
                if binding.key == key
                    && binding.ctrl == ctrl
                    && binding.alt == alt
                    && binding.shift == shift
                {
                    info!(tool = %binding.tool, "Hotkey pressed, dispatching");
                    sender
                        .send(binding.tool.clone())
                        .context("Failed to send hotkey command")?;
                }
            }
        }
    }
}

/// Whether input devices are readable at all
pub fn check_permissions() -> bool {
    std::fs::read_dir(input::DEV_INPUT).is_ok()
}

pub fn print_permission_error() {
    error!(path = %input::DEV_INPUT, "Cannot access input devices");
    error!(group = %input::INPUT_GROUP, "Hotkeys require group membership");
    error!(command = %input::ADD_TO_INPUT_GROUP, "Add user to input group");
    error!("  Then log out and back in");
    warn!(continuing = true, "Continuing without hotkey support...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_resolve_case_insensitively() {
        assert_eq!(parse_key_name("f9"), Some(Key::KEY_F9));
        assert_eq!(parse_key_name("F9"), Some(Key::KEY_F9));
        assert_eq!(parse_key_name("a"), Some(Key::KEY_A));
        assert_eq!(parse_key_name("esc"), Some(Key::KEY_ESC));
        assert_eq!(parse_key_name("hyperdrive"), None);
    }

    #[test]
    fn unknown_keys_are_skipped_not_fatal() {
        let mut map = HashMap::new();
        map.insert(
            "capture".to_string(),
            KeyCombo {
                ctrl: true,
                alt: false,
                shift: false,
                key: "F9".into(),
            },
        );
        map.insert(
            "broken".to_string(),
            KeyCombo {
                ctrl: false,
                alt: false,
                shift: false,
                key: "NOSUCH".into(),
            },
        );
        let resolved = resolve_bindings(&map);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].tool, "capture");
        assert!(resolved[0].ctrl);
    }
}
