//! Freedesktop icon names used by the tray.

/// Tray icon while idle
pub const ICON_IDLE: &str = "accessories-text-editor";

/// Tray icon while a sync is running
pub const ICON_SYNCING: &str = "view-refresh";

/// Attention icon shown when everpad reports new data
pub const ICON_UPDATED: &str = "mail-unread";

pub const ICON_CREATE_NOTE: &str = "document-new";
pub const ICON_ALL_NOTES: &str = "view-list";
pub const ICON_SETTINGS: &str = "preferences-system";
pub const ICON_EXIT: &str = "application-exit";
