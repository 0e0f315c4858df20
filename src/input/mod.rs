//! Input handling: global hotkey registration.

pub mod hotkey;

pub use hotkey::{Accelerator, GlobalHotkey, HotkeyError, HotkeyEvent, Keybindings};
