//! everpad-indicator library exports for testing and fuzzing.
//!
//! The binary is a thin CLI over [`daemon`]; everything else is exposed so
//! integration tests and fuzz targets can reach it.

pub mod config;
#[cfg(target_os = "linux")]
pub mod daemon;
pub mod dbus;
pub mod input;
pub mod panic_handler;
pub mod presence;
pub mod tray;

// Re-export commonly used types for convenience
pub use config::Config;
pub use input::Accelerator;
pub use presence::{PresenceController, PresenceSettings, PresenceState};
