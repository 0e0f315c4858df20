//! Global hotkey registration using rdev.
//!
//! One accelerator (e.g. `Super+E` or the GSettings form `<Super>e`) can be
//! bound at a time. The rdev listener thread is started on the first
//! registration and keeps running; unregistering only disarms it.

use rdev::{listen, Event, EventType, Key};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Failed to start hotkey listener: {0}")]
    StartFailed(String),

    #[error("Invalid hotkey: {0}")]
    InvalidHotkey(String),
}

/// Events emitted by the hotkey listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The bound accelerator was pressed
    Activated,
}

/// Modifier keys held as part of an accelerator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub super_key: bool,
}

impl Modifiers {
    /// Update from a key event. Returns `false` if `key` is not a modifier.
    fn apply(&mut self, key: Key, pressed: bool) -> bool {
        match key {
            Key::ControlLeft | Key::ControlRight => self.ctrl = pressed,
            Key::Alt | Key::AltGr => self.alt = pressed,
            Key::ShiftLeft | Key::ShiftRight => self.shift = pressed,
            Key::MetaLeft | Key::MetaRight => self.super_key = pressed,
            _ => return false,
        }
        true
    }
}

/// A key plus the modifiers that must be held with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Accelerator {
    pub modifiers: Modifiers,
    pub key: Key,
    label: String,
}

impl Accelerator {
    pub fn parse(s: &str) -> Result<Self, HotkeyError> {
        s.parse()
    }
}

impl FromStr for Accelerator {
    type Err = HotkeyError;

    /// Accepts `Ctrl+Alt+N`, `super+e` and GSettings' `<Control><Alt>n`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('<', "").replace('>', "+");
        let parts: Vec<&str> = normalized
            .split('+')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let Some((key_part, modifier_parts)) = parts.split_last() else {
            return Err(HotkeyError::InvalidHotkey(format!(
                "Empty accelerator: '{}'",
                s
            )));
        };

        let mut modifiers = Modifiers::default();
        let mut label = String::new();
        for part in modifier_parts {
            let name = match part.to_lowercase().as_str() {
                "ctrl" | "control" | "primary" => {
                    modifiers.ctrl = true;
                    "Ctrl"
                }
                "alt" | "mod1" => {
                    modifiers.alt = true;
                    "Alt"
                }
                "shift" => {
                    modifiers.shift = true;
                    "Shift"
                }
                "super" | "meta" | "win" | "mod4" => {
                    modifiers.super_key = true;
                    "Super"
                }
                other => {
                    return Err(HotkeyError::InvalidHotkey(format!(
                        "Unknown modifier '{}' in '{}'",
                        other, s
                    )))
                }
            };
            label.push_str(name);
            label.push('+');
        }

        let key = parse_key(key_part)?;
        label.push_str(&key_part.to_uppercase());

        Ok(Self {
            modifiers,
            key,
            label,
        })
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Registers and deregisters the single global hotkey.
pub trait Keybindings {
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), HotkeyError>;

    /// Disarm the hotkey. Harmless when nothing is registered.
    fn unregister(&mut self);
}

/// Tracks modifier state across key events and detects accelerator presses.
#[derive(Debug, Default)]
struct ChordTracker {
    held: Modifiers,
    key_down: bool,
}

impl ChordTracker {
    /// Feed one event; returns `true` when `accelerator` was just pressed.
    fn feed(&mut self, event: &EventType, accelerator: &Accelerator) -> bool {
        match *event {
            EventType::KeyPress(key) => {
                if self.held.apply(key, true) && key != accelerator.key {
                    return false;
                }
                if key == accelerator.key && self.held == accelerator.modifiers {
                    // Only fire once per press (ignore key repeat)
                    return !std::mem::replace(&mut self.key_down, true);
                }
                false
            }
            EventType::KeyRelease(key) => {
                self.held.apply(key, false);
                if key == accelerator.key {
                    self.key_down = false;
                }
                false
            }
            _ => false,
        }
    }
}

/// rdev-backed [`Keybindings`].
pub struct GlobalHotkey {
    binding: Arc<Mutex<Option<Accelerator>>>,
    started: bool,
    event_tx: UnboundedSender<HotkeyEvent>,
}

impl GlobalHotkey {
    pub fn new(event_tx: UnboundedSender<HotkeyEvent>) -> Self {
        Self {
            binding: Arc::new(Mutex::new(None)),
            started: false,
            event_tx,
        }
    }

    fn binding(&self) -> MutexGuard<'_, Option<Accelerator>> {
        lock(&self.binding)
    }

    fn start(&mut self) -> Result<(), HotkeyError> {
        if self.started {
            return Ok(());
        }

        let binding = self.binding.clone();
        let event_tx = self.event_tx.clone();

        thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                info!("Hotkey listener started");
                let mut tracker = ChordTracker::default();

                let callback = move |event: Event| {
                    let guard = lock(&binding);
                    let Some(accelerator) = guard.as_ref() else {
                        return;
                    };
                    if tracker.feed(&event.event_type, accelerator) {
                        debug!("Hotkey activated: {}", accelerator);
                        if let Err(e) = event_tx.send(HotkeyEvent::Activated) {
                            error!("Failed to send hotkey event: {}", e);
                        }
                    }
                };

                if let Err(e) = listen(callback) {
                    error!("Hotkey listener error: {:?}", e);
                }
            })
            .map_err(|e| HotkeyError::StartFailed(e.to_string()))?;

        self.started = true;
        Ok(())
    }
}

impl Keybindings for GlobalHotkey {
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), HotkeyError> {
        self.start()?;
        *self.binding() = Some(accelerator.clone());
        info!("Hotkey bound: {}", accelerator);
        Ok(())
    }

    fn unregister(&mut self) {
        if self.binding().take().is_some() {
            debug!("Hotkey unbound");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Parse a key string into an rdev Key
///
/// Supports formats like:
/// - "a" through "z", "0" through "9"
/// - "F1" through "F12"
/// - "Space", "Escape", "Tab", etc.
pub fn parse_key(key_str: &str) -> Result<Key, HotkeyError> {
    let normalized = key_str.to_lowercase().replace(['_', '-'], "");

    let key = match normalized.as_str() {
        // Letters
        "a" => Key::KeyA,
        "b" => Key::KeyB,
        "c" => Key::KeyC,
        "d" => Key::KeyD,
        "e" => Key::KeyE,
        "f" => Key::KeyF,
        "g" => Key::KeyG,
        "h" => Key::KeyH,
        "i" => Key::KeyI,
        "j" => Key::KeyJ,
        "k" => Key::KeyK,
        "l" => Key::KeyL,
        "m" => Key::KeyM,
        "n" => Key::KeyN,
        "o" => Key::KeyO,
        "p" => Key::KeyP,
        "q" => Key::KeyQ,
        "r" => Key::KeyR,
        "s" => Key::KeyS,
        "t" => Key::KeyT,
        "u" => Key::KeyU,
        "v" => Key::KeyV,
        "w" => Key::KeyW,
        "x" => Key::KeyX,
        "y" => Key::KeyY,
        "z" => Key::KeyZ,

        // Digits
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,

        // Function keys
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        // Special keys
        "space" => Key::Space,
        "escape" | "esc" => Key::Escape,
        "tab" => Key::Tab,
        "backspace" | "back" => Key::Backspace,
        "enter" | "return" => Key::Return,
        "insert" | "ins" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,

        _ => {
            return Err(HotkeyError::InvalidHotkey(format!(
                "Unknown key: '{}'. Valid examples: e, F12, Space",
                key_str
            )))
        }
    };

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    // ===================
    // Key Parsing Tests
    // ===================

    #[test]
    fn test_parse_key_letters_and_digits() {
        assert_eq!(parse_key("e").unwrap(), Key::KeyE);
        assert_eq!(parse_key("E").unwrap(), Key::KeyE);
        assert_eq!(parse_key("z").unwrap(), Key::KeyZ);
        assert_eq!(parse_key("0").unwrap(), Key::Num0);
        assert_eq!(parse_key("7").unwrap(), Key::Num7);
    }

    #[test]
    fn test_parse_key_function_keys() {
        assert_eq!(parse_key("F1").unwrap(), Key::F1);
        assert_eq!(parse_key("f12").unwrap(), Key::F12);
    }

    #[test]
    fn test_parse_key_special() {
        assert_eq!(parse_key("Space").unwrap(), Key::Space);
        assert_eq!(parse_key("escape").unwrap(), Key::Escape);
        assert_eq!(parse_key("esc").unwrap(), Key::Escape);
        assert_eq!(parse_key("enter").unwrap(), Key::Return);
    }

    #[test]
    fn test_parse_key_invalid_error_message() {
        let err = parse_key("invalid_key").unwrap_err();
        assert!(err.to_string().contains("Unknown key"));
        assert!(err.to_string().contains("invalid_key"));
    }

    // ===================
    // Accelerator Tests
    // ===================

    #[test]
    fn test_accelerator_plus_form() {
        let accel = Accelerator::parse("Super+E").unwrap();
        assert!(accel.modifiers.super_key);
        assert!(!accel.modifiers.ctrl);
        assert_eq!(accel.key, Key::KeyE);
        assert_eq!(accel.to_string(), "Super+E");
    }

    #[test]
    fn test_accelerator_gsettings_form() {
        let accel = Accelerator::parse("<Control><Alt>n").unwrap();
        assert!(accel.modifiers.ctrl);
        assert!(accel.modifiers.alt);
        assert!(!accel.modifiers.shift);
        assert_eq!(accel.key, Key::KeyN);
        assert_eq!(accel.to_string(), "Ctrl+Alt+N");
    }

    #[test]
    fn test_accelerator_without_modifiers() {
        let accel = Accelerator::parse("F9").unwrap();
        assert_eq!(accel.modifiers, Modifiers::default());
        assert_eq!(accel.key, Key::F9);
    }

    #[test]
    fn test_accelerator_invalid() {
        assert!(Accelerator::parse("").is_err());
        assert!(Accelerator::parse("+").is_err());
        assert!(Accelerator::parse("Hyper+E").is_err());
        assert!(Accelerator::parse("Ctrl+nope").is_err());
    }

    // ===================
    // Chord Tracking Tests
    // ===================

    #[test]
    fn test_chord_fires_once_per_press() {
        let accel = Accelerator::parse("Ctrl+E").unwrap();
        let mut tracker = ChordTracker::default();

        assert!(!tracker.feed(&EventType::KeyPress(Key::ControlLeft), &accel));
        assert!(tracker.feed(&EventType::KeyPress(Key::KeyE), &accel));
        // key repeat
        assert!(!tracker.feed(&EventType::KeyPress(Key::KeyE), &accel));
        assert!(!tracker.feed(&EventType::KeyRelease(Key::KeyE), &accel));
        assert!(tracker.feed(&EventType::KeyPress(Key::KeyE), &accel));
    }

    #[test]
    fn test_chord_requires_exact_modifiers() {
        let accel = Accelerator::parse("Ctrl+E").unwrap();
        let mut tracker = ChordTracker::default();

        assert!(!tracker.feed(&EventType::KeyPress(Key::KeyE), &accel));
        assert!(!tracker.feed(&EventType::KeyRelease(Key::KeyE), &accel));

        tracker.feed(&EventType::KeyPress(Key::ControlLeft), &accel);
        tracker.feed(&EventType::KeyPress(Key::ShiftLeft), &accel);
        assert!(!tracker.feed(&EventType::KeyPress(Key::KeyE), &accel));
    }

    #[test]
    fn test_chord_tracks_modifier_release() {
        let accel = Accelerator::parse("Super+E").unwrap();
        let mut tracker = ChordTracker::default();

        tracker.feed(&EventType::KeyPress(Key::MetaLeft), &accel);
        tracker.feed(&EventType::KeyRelease(Key::MetaLeft), &accel);
        assert!(!tracker.feed(&EventType::KeyPress(Key::KeyE), &accel));
    }

    // ===================
    // Registration Tests
    // ===================

    #[test]
    fn test_unregister_without_register_is_noop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut hotkey = GlobalHotkey::new(tx);
        hotkey.unregister();
        hotkey.unregister();
        assert!(hotkey.binding().is_none());
        assert!(!hotkey.started);
    }

    #[test]
    fn test_hotkey_error_display() {
        let err = HotkeyError::InvalidHotkey("test".to_string());
        assert!(err.to_string().contains("Invalid hotkey"));

        let err = HotkeyError::StartFailed("failed".to_string());
        assert!(err.to_string().contains("Failed to start"));
    }
}
