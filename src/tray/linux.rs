//! Linux tray presence using ksni (D-Bus StatusNotifierItem).
//!
//! [`TrayPresence`] is a synchronous facade: the controller mutates a
//! [`PanelModel`] and the model is pushed over a watch channel to a task that
//! owns the ksni handle. Dropping the facade shuts the tray down.

use super::icon::{ICON_SYNCING, ICON_UPDATED};
use super::{
    ClickButton, MenuAction, NotesPopup, PanelPresence, PresenceFactory, ProgressIndicator,
    TrayError, TrayEvent,
};
use crate::config::TrayConfig;
use crate::presence::SyncProgress;
use ksni::menu::*;
use ksni::{Status, ToolTip, Tray, TrayMethods};
use tokio::sync::{mpsc::UnboundedSender, watch};
use tracing::{debug, error, info};

/// Everything the tray renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelModel {
    /// Text of the progress row in the menu, when a sync is running
    pub menu_progress: Option<String>,
    /// Step shown on the tray icon, when a sync is running
    pub panel_progress: Option<u32>,
    /// everpad reported new data since the user last interacted
    pub updated: bool,
}

/// everpad tray implementation
struct EverpadTray {
    model: PanelModel,
    icon_name: String,
    event_tx: UnboundedSender<TrayEvent>,
}

impl EverpadTray {
    fn send(&self, event: TrayEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Event loop gone, dropping {:?}", event);
        }
    }

    fn status_line(&self) -> String {
        self.model
            .menu_progress
            .clone()
            .unwrap_or_else(|| "everpad is running".into())
    }
}

impl Tray for EverpadTray {
    fn id(&self) -> String {
        "everpad-indicator".into()
    }

    fn title(&self) -> String {
        "Everpad".into()
    }

    fn icon_name(&self) -> String {
        if self.model.panel_progress.is_some() {
            ICON_SYNCING.into()
        } else {
            self.icon_name.clone()
        }
    }

    fn attention_icon_name(&self) -> String {
        ICON_UPDATED.into()
    }

    fn status(&self) -> Status {
        if self.model.updated {
            Status::NeedsAttention
        } else {
            Status::Active
        }
    }

    fn tool_tip(&self) -> ToolTip {
        let description = match self.model.panel_progress {
            Some(step) => format!("Syncing (step {})", step),
            None if self.model.updated => "Notes updated".into(),
            None => String::new(),
        };

        ToolTip {
            title: "Everpad".into(),
            description,
            icon_name: self.icon_name(),
            icon_pixmap: Vec::new(),
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let mut items: Vec<MenuItem<Self>> = vec![
            // Status (disabled, just for display)
            StandardItem {
                label: self.status_line(),
                enabled: false,
                ..Default::default()
            }
            .into(),
            MenuItem::Separator,
        ];

        for action in MenuAction::ALL {
            if action == MenuAction::Exit {
                items.push(MenuItem::Separator);
            }
            items.push(
                StandardItem {
                    label: action.label().into(),
                    icon_name: action.icon_name().into(),
                    activate: Box::new(move |tray: &mut Self| {
                        debug!("Tray: {} clicked", action.label());
                        tray.send(TrayEvent::Menu(action));
                    }),
                    ..Default::default()
                }
                .into(),
            );
        }

        items
    }

    fn activate(&mut self, _x: i32, _y: i32) {
        self.send(TrayEvent::Click(ClickButton::Primary));
    }

    fn secondary_activate(&mut self, _x: i32, _y: i32) {
        // StatusNotifierItem hosts report middle clicks as SecondaryActivate
        self.send(TrayEvent::Click(ClickButton::Middle));
    }
}

/// A live ksni tray.
pub struct TrayPresence {
    model: PanelModel,
    show_panel_progress: bool,
    updates: Option<watch::Sender<PanelModel>>,
}

impl TrayPresence {
    pub fn model(&self) -> &PanelModel {
        &self.model
    }

    fn publish(&mut self) {
        if let Some(updates) = &self.updates {
            let model = self.model.clone();
            updates.send_if_modified(|current| {
                if *current == model {
                    false
                } else {
                    *current = model;
                    true
                }
            });
        }
    }
}

impl PanelPresence for TrayPresence {
    fn show_progress(&mut self, indicator: ProgressIndicator, progress: &SyncProgress) {
        match indicator {
            ProgressIndicator::Menu => self.model.menu_progress = Some(progress.describe()),
            ProgressIndicator::Panel if self.show_panel_progress => {
                self.model.panel_progress = Some(progress.step_count)
            }
            ProgressIndicator::Panel => {}
        }
        self.publish();
    }

    fn hide_progress(&mut self, indicator: ProgressIndicator) {
        match indicator {
            ProgressIndicator::Menu => self.model.menu_progress = None,
            ProgressIndicator::Panel => self.model.panel_progress = None,
        }
        self.publish();
    }

    fn set_updated(&mut self, updated: bool) {
        self.model.updated = updated;
        self.publish();
    }

    fn hide_menu(&mut self) {
        // The host owns the menu and closes it on activation
    }

    fn notes_popup(&mut self) -> Option<&mut dyn NotesPopup> {
        None
    }

    fn destroy(&mut self) {
        if self.updates.take().is_some() {
            debug!("Tray presence destroyed");
        }
    }
}

impl Drop for TrayPresence {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Spawns a ksni tray per presence.
pub struct TrayFactory {
    config: TrayConfig,
    event_tx: UnboundedSender<TrayEvent>,
}

impl TrayFactory {
    pub fn new(config: TrayConfig, event_tx: UnboundedSender<TrayEvent>) -> Self {
        Self { config, event_tx }
    }
}

impl PresenceFactory for TrayFactory {
    type Presence = TrayPresence;

    fn create(&mut self) -> Result<TrayPresence, TrayError> {
        // Check for D-Bus session bus
        if !super::is_tray_supported() {
            return Err(TrayError::NotSupported);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TrayError::TrayBuild(e.to_string()))?;

        let tray = EverpadTray {
            model: PanelModel::default(),
            icon_name: self.config.icon_name.clone(),
            event_tx: self.event_tx.clone(),
        };

        let (updates, rx) = watch::channel(PanelModel::default());
        runtime.spawn(run_tray(tray, rx));

        Ok(TrayPresence {
            model: PanelModel::default(),
            show_panel_progress: self.config.show_panel_progress,
            updates: Some(updates),
        })
    }
}

/// Owns the ksni service for one presence.
///
/// Lives until the facade drops its watch sender.
async fn run_tray(tray: EverpadTray, mut updates: watch::Receiver<PanelModel>) {
    let handle = match tray.spawn().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to register tray icon: {}", e);
            return;
        }
    };
    info!("System tray initialized (D-Bus StatusNotifierItem)");

    while updates.changed().await.is_ok() {
        let model = updates.borrow_and_update().clone();
        debug!("Updating tray: {:?}", model);
        handle
            .update(move |tray: &mut EverpadTray| {
                tray.model = model;
            })
            .await;
    }

    handle.shutdown().await;
    info!("System tray removed");
}
