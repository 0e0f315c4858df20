//! D-Bus integration with the everpad daemon.
//!
//! Two remote endpoints are involved: the bus registry itself
//! (`org.freedesktop.DBus`) and everpad's own services.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ListNames / NameOwnerChanged   ┌────────────────────┐
//! │                  │<─────────────────────────────────│ org.freedesktop.   │
//! │  everpad-        │                                  │ DBus               │
//! │  indicator       │   create / all_notes / ...       ├────────────────────┤
//! │  (DbusBus)       │─────────────────────────────────>│ com.everpad.App    │
//! │                  │   sync_state_changed / sync      ├────────────────────┤
//! │                  │<────────────────────────────────>│ com.everpad.       │
//! └──────────────────┘                                  │ Provider           │
//!                                                       └────────────────────┘
//! ```
//!
//! Everything coming back from the bus (method replies and signals) is turned
//! into a [`BusEvent`] and pushed onto a single channel, so the event loop sees
//! events in the order the bus delivered them.

#[cfg(target_os = "linux")]
mod client;
#[cfg(target_os = "linux")]
mod proxy;

#[cfg(target_os = "linux")]
pub use client::{DbusBus, EndpointHandles};

use std::fmt;
use thiserror::Error;

/// Well-known bus name of the everpad application.
pub const APP_BUS_NAME: &str = "com.everpad.App";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Failed to connect to session bus: {0}")]
    Connection(String),

    #[error("D-Bus call failed: {0}")]
    Call(String),
}

#[cfg(target_os = "linux")]
impl From<zbus::Error> for BusError {
    fn from(e: zbus::Error) -> Self {
        BusError::Call(e.to_string())
    }
}

#[cfg(target_os = "linux")]
impl From<zbus::fdo::Error> for BusError {
    fn from(e: zbus::fdo::Error) -> Self {
        BusError::Call(e.to_string())
    }
}

/// Signals the indicator can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusSignal {
    /// `org.freedesktop.DBus.NameOwnerChanged`, filtered to everpad's name
    NameOwnerChanged,
    /// `com.everpad.Provider.sync_state_changed`
    SyncStateChanged,
    /// `com.everpad.Provider.data_changed`
    DataChanged,
}

/// Fire-and-forget calls into everpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    /// Open the note editor on a fresh note
    Create,
    /// Open the "all notes" window
    AllNotes,
    /// Open everpad's settings dialog
    Settings,
    /// Ask everpad to exit
    Kill,
    /// Start a sync run
    Sync,
}

impl RemoteCall {
    /// Remote method name as exported by everpad.
    pub fn method_name(&self) -> &'static str {
        match self {
            RemoteCall::Create => "create",
            RemoteCall::AllNotes => "all_notes",
            RemoteCall::Settings => "settings",
            RemoteCall::Kill => "kill",
            RemoteCall::Sync => "sync",
        }
    }
}

/// Replies and signals delivered from the bus to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Reply to a `ListNames` request
    NamesListed(Result<Vec<String>, BusError>),
    /// Ownership of a watched name changed. Empty strings mean "no owner".
    NameOwnerChanged {
        name: String,
        old_owner: String,
        new_owner: String,
    },
    /// Raw sync state reported by the provider
    SyncStateChanged(i32),
    /// The provider's note data changed
    DataChanged,
}

/// A registered signal listener.
///
/// Cancelling (or dropping) the handle removes the listener. Cancelling a
/// listener whose stream already ended is a no-op.
pub struct Subscription {
    signal: BusSignal,
    canceller: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(signal: BusSignal, canceller: impl FnOnce() + 'static) -> Self {
        Self {
            signal,
            canceller: Some(Box::new(canceller)),
        }
    }

    pub fn signal(&self) -> BusSignal {
        self.signal
    }

    /// Remove the listener.
    pub fn cancel(mut self) {
        self.run_canceller();
    }

    fn run_canceller(&mut self) {
        if let Some(cancel) = self.canceller.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_canceller();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("signal", &self.signal)
            .field("active", &self.canceller.is_some())
            .finish()
    }
}

/// The bus operations the presence controller needs.
///
/// Every method returns immediately. Results and signals come back later as
/// [`BusEvent`]s through whatever channel the implementation was built with.
pub trait BusClient {
    /// Ask the registry for the currently owned names. Answered by
    /// [`BusEvent::NamesListed`].
    fn list_names(&mut self);

    /// Start forwarding `signal` as [`BusEvent`]s until the returned handle is
    /// cancelled.
    fn subscribe(&mut self, signal: BusSignal) -> Subscription;

    /// Send `call` without waiting for its reply.
    fn call(&mut self, call: RemoteCall);

    /// Drop every cached proxy to the everpad services.
    fn dispose_endpoints(&mut self);
}
