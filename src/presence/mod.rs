//! Presence controller: decides whether the tray presence exists and keeps
//! what it shows in line with everpad's signals.
//!
//! The controller is synchronous. It is driven by the daemon's event loop,
//! which feeds it [`BusEvent`]s, tray events and hotkey presses, and it
//! reaches the outside world only through three collaborators:
//!
//! - a [`BusClient`] for registry queries, signal subscriptions and remote
//!   calls,
//! - a [`PresenceFactory`] that builds the tray presence,
//! - a [`Keybindings`] registrar for the global hotkey.
//!
//! # State machine
//!
//! ```text
//!            names listed / owner appeared
//!   Absent ─────────────────────────────────> Present
//!     ^                                          │
//!     └──────────────────────────────────────────┘
//!        owner vanished / list failed / disable
//! ```
//!
//! Both transitions are idempotent and mirror each other: everything set up
//! when entering `Present` is torn down when leaving it.

mod dispatch;
mod progress;

#[cfg(test)]
mod testing;

pub use progress::{SyncProgress, SyncState};

use std::mem;

use tracing::{debug, error, info, warn};

use crate::dbus::{BusClient, BusError, BusEvent, BusSignal, Subscription, APP_BUS_NAME};
use crate::input::{Accelerator, Keybindings};
use crate::tray::{PanelPresence, PresenceFactory, ProgressIndicator};

/// Whether the tray presence currently exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceState {
    #[default]
    Absent,
    Present,
}

/// Note lists the notes popup should reload the next time it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchTriggers {
    pub refresh_latest: bool,
    pub refresh_pinned: bool,
}

impl FetchTriggers {
    pub fn all() -> Self {
        Self {
            refresh_latest: true,
            refresh_pinned: true,
        }
    }

    pub fn any(&self) -> bool {
        self.refresh_latest || self.refresh_pinned
    }

    /// Return the pending triggers and clear them.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }
}

/// Active signal listeners, at most one per signal.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    active: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn contains(&self, signal: BusSignal) -> bool {
        self.active.iter().any(|s| s.signal() == signal)
    }

    /// Register a listener for `signal` unless one is already active.
    ///
    /// `subscribe` is only called when the signal is not yet subscribed.
    /// Returns whether a new listener was registered.
    pub fn insert_with(
        &mut self,
        signal: BusSignal,
        subscribe: impl FnOnce() -> Subscription,
    ) -> bool {
        if self.contains(signal) {
            debug!("Already subscribed to {:?}", signal);
            return false;
        }
        self.active.push(subscribe());
        true
    }

    /// Cancel the listener for `signal`. Returns `false` if there was none.
    pub fn release(&mut self, signal: BusSignal) -> bool {
        match self.active.iter().position(|s| s.signal() == signal) {
            Some(index) => {
                self.active.swap_remove(index).cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Static inputs of the controller.
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    /// Bus name whose presence decides whether the tray exists
    pub watched_name: String,
    /// Hotkey bound while present; `None` disables it
    pub accelerator: Option<Accelerator>,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            watched_name: APP_BUS_NAME.to_string(),
            accelerator: None,
        }
    }
}

/// Owns the presence lifecycle and the sync progress shown by it.
pub struct PresenceController<B, F: PresenceFactory, K> {
    bus: B,
    factory: F,
    keybindings: K,
    settings: PresenceSettings,
    presence: Option<F::Presence>,
    progress: SyncProgress,
    triggers: FetchTriggers,
    /// The presence shows the "updated" cue
    updated: bool,
    subscriptions: SubscriptionSet,
    hotkey_bound: bool,
    enabled: bool,
    /// A watched-name owner change arrived after the last `ListNames` request
    owner_changed_since_check: bool,
}

impl<B, F, K> PresenceController<B, F, K>
where
    B: BusClient,
    F: PresenceFactory,
    K: Keybindings,
{
    pub fn new(bus: B, factory: F, keybindings: K, settings: PresenceSettings) -> Self {
        Self {
            bus,
            factory,
            keybindings,
            settings,
            presence: None,
            progress: SyncProgress::default(),
            triggers: FetchTriggers::default(),
            updated: false,
            subscriptions: SubscriptionSet::default(),
            hotkey_bound: false,
            enabled: false,
            owner_changed_since_check: false,
        }
    }

    pub fn state(&self) -> PresenceState {
        if self.presence.is_some() {
            PresenceState::Present
        } else {
            PresenceState::Absent
        }
    }

    pub fn progress(&self) -> &SyncProgress {
        &self.progress
    }

    pub fn fetch_triggers(&self) -> FetchTriggers {
        self.triggers
    }

    pub fn presence(&self) -> Option<&F::Presence> {
        self.presence.as_ref()
    }

    pub fn is_marked_updated(&self) -> bool {
        self.updated
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn is_hotkey_bound(&self) -> bool {
        self.hotkey_bound
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start watching everpad's bus name and check whether it is already up.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;

        let bus = &mut self.bus;
        self.subscriptions
            .insert_with(BusSignal::NameOwnerChanged, || {
                bus.subscribe(BusSignal::NameOwnerChanged)
            });
        self.startup_check();
    }

    /// Stop watching and tear everything down.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;

        self.subscriptions.release(BusSignal::NameOwnerChanged);
        self.transition_to(PresenceState::Absent);
        self.bus.dispose_endpoints();
    }

    /// Ask the registry which names are owned right now.
    ///
    /// The answer comes back through [`Self::on_names_listed`].
    pub fn startup_check(&mut self) {
        debug!("Checking whether {} is on the bus", self.settings.watched_name);
        self.owner_changed_since_check = false;
        self.bus.list_names();
    }

    /// Apply the `ListNames` reply.
    ///
    /// Ignored once an owner change for the watched name has been seen, since
    /// the signal is at least as recent as the reply.
    pub fn on_names_listed(&mut self, result: Result<Vec<String>, BusError>) {
        if self.owner_changed_since_check {
            debug!("Ignoring name list older than the last owner change");
            return;
        }

        let found = match result {
            Ok(names) => names.iter().any(|n| *n == self.settings.watched_name),
            Err(e) => {
                error!("Failed to list bus names: {}", e);
                false
            }
        };

        if found {
            self.transition_to(PresenceState::Present);
        } else {
            debug!("{} not found on the bus", self.settings.watched_name);
            self.transition_to(PresenceState::Absent);
        }
    }

    pub fn on_ownership_changed(&mut self, name: &str, old_owner: &str, new_owner: &str) {
        if name != self.settings.watched_name {
            return;
        }
        self.owner_changed_since_check = true;

        if !old_owner.is_empty() && new_owner.is_empty() {
            info!("{} left the bus", name);
            self.transition_to(PresenceState::Absent);
        } else {
            self.transition_to(PresenceState::Present);
        }
    }

    pub fn on_sync_state_changed(&mut self, state: SyncState) {
        let Some(presence) = self.presence.as_mut() else {
            debug!("Ignoring sync state {:?} without presence", state);
            return;
        };

        if self.progress.advance(state) {
            debug!(
                "Sync step {}: {}",
                self.progress.step_count, self.progress.current_state_label
            );
            presence.show_progress(ProgressIndicator::Menu, &self.progress);
            presence.show_progress(ProgressIndicator::Panel, &self.progress);
        } else {
            debug!("Sync finished");
            presence.hide_progress(ProgressIndicator::Panel);
            presence.hide_progress(ProgressIndicator::Menu);
        }
    }

    pub fn on_data_changed(&mut self) {
        let Some(presence) = self.presence.as_mut() else {
            return;
        };

        let popup_open = presence.notes_popup().is_some_and(|popup| popup.is_open());
        if !popup_open && !self.updated {
            self.updated = true;
            presence.set_updated(true);
        }
    }

    /// Route one event from the bus.
    pub fn handle_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::NamesListed(result) => self.on_names_listed(result),
            BusEvent::NameOwnerChanged {
                name,
                old_owner,
                new_owner,
            } => self.on_ownership_changed(&name, &old_owner, &new_owner),
            BusEvent::SyncStateChanged(raw) => self.on_sync_state_changed(SyncState::from(raw)),
            BusEvent::DataChanged => self.on_data_changed(),
        }
    }

    pub fn transition_to(&mut self, target: PresenceState) {
        match target {
            PresenceState::Present => self.show(),
            PresenceState::Absent => self.hide(),
        }
    }

    fn show(&mut self) {
        if self.presence.is_some() {
            return;
        }

        let presence = match self.factory.create() {
            Ok(presence) => presence,
            Err(e) => {
                error!("Failed to create tray presence: {}", e);
                return;
            }
        };
        self.presence = Some(presence);
        info!("{} is running, tray presence shown", self.settings.watched_name);

        self.bind_hotkey();

        let bus = &mut self.bus;
        for signal in [BusSignal::SyncStateChanged, BusSignal::DataChanged] {
            self.subscriptions
                .insert_with(signal, || bus.subscribe(signal));
        }

        self.triggers = FetchTriggers::all();
    }

    fn hide(&mut self) {
        let Some(mut presence) = self.presence.take() else {
            return;
        };

        self.subscriptions.release(BusSignal::SyncStateChanged);
        self.subscriptions.release(BusSignal::DataChanged);
        self.unbind_hotkey();
        presence.destroy();
        self.progress.reset();
        self.updated = false;
        self.bus.dispose_endpoints();

        info!("Tray presence removed");
    }

    fn bind_hotkey(&mut self) {
        let Some(accelerator) = &self.settings.accelerator else {
            return;
        };

        match self.keybindings.register(accelerator) {
            Ok(()) => self.hotkey_bound = true,
            Err(e) => warn!("Hotkey {} not available: {}", accelerator, e),
        }
    }

    fn unbind_hotkey(&mut self) {
        if mem::take(&mut self.hotkey_bound) {
            self.keybindings.unregister();
        }
    }
}
