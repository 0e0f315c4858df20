//! User input on the presence: clicks, menu entries and the hotkey.
//!
//! Every handler issues at most one remote call and never waits for it.
//! Any interaction clears the "updated" cue.

use tracing::debug;

use super::{FetchTriggers, PresenceController};
use crate::dbus::{BusClient, RemoteCall};
use crate::input::Keybindings;
use crate::tray::{ClickButton, MenuAction, PanelPresence, PresenceFactory, TrayEvent};

impl MenuAction {
    pub fn remote_call(&self) -> RemoteCall {
        match self {
            MenuAction::CreateNote => RemoteCall::Create,
            MenuAction::AllNotes => RemoteCall::AllNotes,
            MenuAction::Settings => RemoteCall::Settings,
            MenuAction::Exit => RemoteCall::Kill,
        }
    }
}

impl<B, F, K> PresenceController<B, F, K>
where
    B: BusClient,
    F: PresenceFactory,
    K: Keybindings,
{
    pub fn on_tray_event(&mut self, event: TrayEvent) {
        match event {
            TrayEvent::Click(button) => self.on_click(button),
            TrayEvent::Menu(action) => self.on_menu_action(action),
        }
    }

    pub fn on_click(&mut self, button: ClickButton) {
        let Some(presence) = self.presence.as_mut() else {
            debug!("Ignoring {:?} click without presence", button);
            return;
        };
        clear_updated(presence, &mut self.updated);

        match button {
            ClickButton::Primary => {
                self.bus.call(RemoteCall::AllNotes);
                hide_notes_popup(presence);
            }
            ClickButton::Secondary => {
                toggle_notes_popup(presence, &mut self.triggers);
                presence.hide_menu();
            }
            ClickButton::Middle => self.bus.call(RemoteCall::Sync),
        }
    }

    pub fn on_menu_action(&mut self, action: MenuAction) {
        let Some(presence) = self.presence.as_mut() else {
            debug!("Ignoring {:?} without presence", action);
            return;
        };
        clear_updated(presence, &mut self.updated);

        self.bus.call(action.remote_call());
        presence.hide_menu();
        hide_notes_popup(presence);
    }

    /// The global hotkey toggles the notes popup, or opens everpad's note
    /// list when the presence has no popup.
    pub fn on_hotkey(&mut self) {
        let Some(presence) = self.presence.as_mut() else {
            return;
        };
        clear_updated(presence, &mut self.updated);

        if !toggle_notes_popup(presence, &mut self.triggers) {
            self.bus.call(RemoteCall::AllNotes);
        }
    }
}

fn clear_updated<P: PanelPresence>(presence: &mut P, updated: &mut bool) {
    if std::mem::take(updated) {
        presence.set_updated(false);
    }
}

fn hide_notes_popup<P: PanelPresence>(presence: &mut P) {
    if let Some(popup) = presence.notes_popup() {
        if popup.is_open() {
            popup.hide();
        }
    }
}

/// Returns `false` if the presence has no popup.
fn toggle_notes_popup<P: PanelPresence>(presence: &mut P, triggers: &mut FetchTriggers) -> bool {
    let Some(popup) = presence.notes_popup() else {
        return false;
    };

    if popup.toggle() {
        let pending = triggers.take();
        if pending.any() {
            popup.refresh(pending);
        }
    }
    true
}
