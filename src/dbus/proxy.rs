//! Client-side proxies for the everpad services.
//!
//! everpad exports its members in snake_case, so each one carries an explicit
//! `name` instead of zbus' default PascalCase conversion.

/// `com.everpad.App`: window and lifecycle actions.
#[zbus::proxy(
    interface = "com.everpad.App",
    default_service = "com.everpad.App",
    default_path = "/EverpadService"
)]
pub trait EverpadApp {
    #[zbus(name = "create", no_reply)]
    fn create(&self) -> zbus::Result<()>;

    #[zbus(name = "all_notes", no_reply)]
    fn all_notes(&self) -> zbus::Result<()>;

    #[zbus(name = "settings", no_reply)]
    fn settings(&self) -> zbus::Result<()>;

    #[zbus(name = "kill", no_reply)]
    fn kill(&self) -> zbus::Result<()>;
}

/// `com.everpad.Provider`: note storage and synchronization.
#[zbus::proxy(
    interface = "com.everpad.Provider",
    default_service = "com.everpad.Provider",
    default_path = "/EverpadProvider"
)]
pub trait EverpadProvider {
    #[zbus(name = "sync", no_reply)]
    fn sync(&self) -> zbus::Result<()>;

    #[zbus(signal, name = "sync_state_changed")]
    fn sync_state_changed(&self, state: i32) -> zbus::Result<()>;

    #[zbus(signal, name = "data_changed")]
    fn data_changed(&self) -> zbus::Result<()>;
}
