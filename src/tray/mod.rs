//! Tray presence: icon, menu and progress cues for a running everpad.
//!
//! The presence controller only talks to the [`PanelPresence`] and
//! [`PresenceFactory`] traits. On Linux they are backed by the ksni crate
//! (D-Bus StatusNotifierItem), which works on KDE, GNOME with the
//! AppIndicator extension, and most wlroots bars without GTK.

use thiserror::Error;

use crate::presence::{FetchTriggers, SyncProgress};

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::*;

pub mod icon;

#[derive(Error, Debug)]
pub enum TrayError {
    #[error("Failed to build tray: {0}")]
    TrayBuild(String),

    #[error("System tray not supported on this platform")]
    NotSupported,
}

/// Pointer buttons the presence distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    Primary,
    Secondary,
    Middle,
}

/// Entries of the dropdown menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    CreateNote,
    AllNotes,
    Settings,
    Exit,
}

impl MenuAction {
    pub const ALL: [MenuAction; 4] = [
        MenuAction::CreateNote,
        MenuAction::AllNotes,
        MenuAction::Settings,
        MenuAction::Exit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::CreateNote => "Create note",
            MenuAction::AllNotes => "All notes",
            MenuAction::Settings => "Settings",
            MenuAction::Exit => "Exit",
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            MenuAction::CreateNote => icon::ICON_CREATE_NOTE,
            MenuAction::AllNotes => icon::ICON_ALL_NOTES,
            MenuAction::Settings => icon::ICON_SETTINGS,
            MenuAction::Exit => icon::ICON_EXIT,
        }
    }
}

/// Events from the tray presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// The tray icon itself was clicked
    Click(ClickButton),
    /// A menu entry was activated
    Menu(MenuAction),
}

/// The two places sync progress is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressIndicator {
    /// Progress row inside the dropdown menu
    Menu,
    /// Compact cue on the tray icon itself
    Panel,
}

/// Quick-notes popup attached to the presence.
pub trait NotesPopup {
    fn is_open(&self) -> bool;

    /// Open or close the popup. Returns `true` if it is now open.
    fn toggle(&mut self) -> bool;

    fn hide(&mut self);

    /// Reload the note lists flagged in `triggers`.
    fn refresh(&mut self, triggers: FetchTriggers);
}

/// A live tray presence.
pub trait PanelPresence {
    fn show_progress(&mut self, indicator: ProgressIndicator, progress: &SyncProgress);

    fn hide_progress(&mut self, indicator: ProgressIndicator);

    /// Toggle the "new data since you last looked" cue.
    fn set_updated(&mut self, updated: bool);

    fn hide_menu(&mut self);

    /// The notes popup, if this presence has one.
    fn notes_popup(&mut self) -> Option<&mut dyn NotesPopup>;

    /// Tear the presence down. Calling this twice is harmless.
    fn destroy(&mut self);
}

/// Creates presences on demand.
pub trait PresenceFactory {
    type Presence: PanelPresence;

    fn create(&mut self) -> Result<Self::Presence, TrayError>;
}

/// Check if system tray is likely to be supported
pub fn is_tray_supported() -> bool {
    session_bus_advertised(std::env::var_os("DBUS_SESSION_BUS_ADDRESS").as_deref())
}

fn session_bus_advertised(address: Option<&std::ffi::OsStr>) -> bool {
    cfg!(target_os = "linux") && address.is_some_and(|a| !a.is_empty())
}
