//! Recording fakes for the controller's collaborators.

use std::cell::RefCell;
use std::rc::Rc;

use super::{FetchTriggers, PresenceController, PresenceSettings, SyncProgress};
use crate::dbus::{BusClient, BusSignal, RemoteCall, Subscription};
use crate::input::{Accelerator, HotkeyError, Keybindings};
use crate::tray::{NotesPopup, PanelPresence, PresenceFactory, ProgressIndicator, TrayError};

/// Side effects observed by the fakes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    ListNames,
    Subscribe(BusSignal),
    Cancel(BusSignal),
    Call(RemoteCall),
    DisposeEndpoints,
    CreatePresence,
    DestroyPresence,
    ShowProgress(ProgressIndicator, u32),
    HideProgress(ProgressIndicator),
    SetUpdated(bool),
    HideMenu,
    TogglePopup(bool),
    HidePopup,
    RefreshPopup(FetchTriggers),
    RegisterHotkey(String),
    UnregisterHotkey,
}

#[derive(Default)]
struct State {
    ops: Vec<Op>,
    created: usize,
    destroyed: usize,
    fail_create: bool,
    fail_register: bool,
    popup_open: bool,
}

/// Shared recorder handed to every fake.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<State>>);

impl Log {
    fn push(&self, op: Op) {
        self.0.borrow_mut().ops.push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.borrow().ops.clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().ops.clear();
    }

    pub fn created(&self) -> usize {
        self.0.borrow().created
    }

    pub fn destroyed(&self) -> usize {
        self.0.borrow().destroyed
    }

    pub fn fail_next_create(&self) {
        self.0.borrow_mut().fail_create = true;
    }

    pub fn fail_next_register(&self) {
        self.0.borrow_mut().fail_register = true;
    }

    pub fn set_popup_open(&self, open: bool) {
        self.0.borrow_mut().popup_open = open;
    }

    pub fn popup_open(&self) -> bool {
        self.0.borrow().popup_open
    }

    pub fn subscription(&self, signal: BusSignal) -> Subscription {
        self.push(Op::Subscribe(signal));
        let log = self.clone();
        Subscription::new(signal, move || log.push(Op::Cancel(signal)))
    }
}

pub struct FakeBus(Log);

impl BusClient for FakeBus {
    fn list_names(&mut self) {
        self.0.push(Op::ListNames);
    }

    fn subscribe(&mut self, signal: BusSignal) -> Subscription {
        self.0.subscription(signal)
    }

    fn call(&mut self, call: RemoteCall) {
        self.0.push(Op::Call(call));
    }

    fn dispose_endpoints(&mut self) {
        self.0.push(Op::DisposeEndpoints);
    }
}

pub struct FakePopup(Log);

impl NotesPopup for FakePopup {
    fn is_open(&self) -> bool {
        self.0.popup_open()
    }

    fn toggle(&mut self) -> bool {
        let open = !self.0.popup_open();
        self.0.set_popup_open(open);
        self.0.push(Op::TogglePopup(open));
        open
    }

    fn hide(&mut self) {
        self.0.set_popup_open(false);
        self.0.push(Op::HidePopup);
    }

    fn refresh(&mut self, triggers: FetchTriggers) {
        self.0.push(Op::RefreshPopup(triggers));
    }
}

pub struct FakePresence {
    log: Log,
    popup: Option<FakePopup>,
    destroyed: bool,
}

impl PanelPresence for FakePresence {
    fn show_progress(&mut self, indicator: ProgressIndicator, progress: &SyncProgress) {
        self.log
            .push(Op::ShowProgress(indicator, progress.step_count));
    }

    fn hide_progress(&mut self, indicator: ProgressIndicator) {
        self.log.push(Op::HideProgress(indicator));
    }

    fn set_updated(&mut self, updated: bool) {
        self.log.push(Op::SetUpdated(updated));
    }

    fn hide_menu(&mut self) {
        self.log.push(Op::HideMenu);
    }

    fn notes_popup(&mut self) -> Option<&mut dyn NotesPopup> {
        self.popup.as_mut().map(|popup| popup as &mut dyn NotesPopup)
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.log.0.borrow_mut().destroyed += 1;
            self.log.push(Op::DestroyPresence);
        }
    }
}

pub struct FakeFactory {
    log: Log,
    with_popup: bool,
}

impl PresenceFactory for FakeFactory {
    type Presence = FakePresence;

    fn create(&mut self) -> Result<FakePresence, TrayError> {
        if std::mem::take(&mut self.log.0.borrow_mut().fail_create) {
            return Err(TrayError::NotSupported);
        }

        self.log.0.borrow_mut().created += 1;
        self.log.push(Op::CreatePresence);
        Ok(FakePresence {
            log: self.log.clone(),
            popup: self.with_popup.then(|| FakePopup(self.log.clone())),
            destroyed: false,
        })
    }
}

pub struct FakeKeys(Log);

impl Keybindings for FakeKeys {
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), HotkeyError> {
        if std::mem::take(&mut self.0 .0.borrow_mut().fail_register) {
            return Err(HotkeyError::StartFailed("no display".into()));
        }
        self.0.push(Op::RegisterHotkey(accelerator.to_string()));
        Ok(())
    }

    fn unregister(&mut self) {
        self.0.push(Op::UnregisterHotkey);
    }
}

pub type TestController = PresenceController<FakeBus, FakeFactory, FakeKeys>;

fn build(settings: PresenceSettings, with_popup: bool) -> (TestController, Log) {
    let log = Log::default();
    let controller = PresenceController::new(
        FakeBus(log.clone()),
        FakeFactory {
            log: log.clone(),
            with_popup,
        },
        FakeKeys(log.clone()),
        settings,
    );
    (controller, log)
}

pub fn controller_with(settings: PresenceSettings) -> (TestController, Log) {
    build(settings, false)
}

/// Controller whose presences carry a notes popup and no hotkey.
pub fn controller_with_popup() -> (TestController, Log) {
    build(PresenceSettings::default(), true)
}
