//! Foreground daemon driving the presence controller.
//!
//! The daemon:
//! 1. Connects to the session bus
//! 2. Watches everpad's bus name
//! 3. Shows the tray presence while everpad runs
//! 4. Routes bus signals, tray input and the hotkey to the controller

use crate::config::{Config, ConfigError};
use crate::dbus::{BusError, BusEvent, DbusBus};
use crate::input::{GlobalHotkey, HotkeyEvent};
use crate::presence::{PresenceController, PresenceSettings};
use crate::tray::{TrayEvent, TrayFactory};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run until interrupted.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let (bus_tx, mut bus_rx) = mpsc::unbounded_channel::<BusEvent>();
    let (tray_tx, mut tray_rx) = mpsc::unbounded_channel::<TrayEvent>();
    let (hotkey_tx, mut hotkey_rx) = mpsc::unbounded_channel::<HotkeyEvent>();

    let settings = PresenceSettings {
        accelerator: config.accelerator()?,
        ..Default::default()
    };
    match &settings.accelerator {
        Some(accelerator) => info!("Hotkey: {}", accelerator),
        None => info!("Hotkey disabled"),
    }

    let bus = DbusBus::connect(bus_tx).await?;
    let factory = TrayFactory::new(config.tray.clone(), tray_tx);
    let keybindings = GlobalHotkey::new(hotkey_tx);

    let mut controller = PresenceController::new(bus, factory, keybindings, settings);
    controller.enable();
    info!("Waiting for everpad on the session bus");

    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            Some(event) = bus_rx.recv() => {
                debug!("Bus event: {:?}", event);
                controller.handle_bus_event(event);
            }

            Some(event) = tray_rx.recv() => {
                debug!("Tray event: {:?}", event);
                controller.on_tray_event(event);
            }

            Some(HotkeyEvent::Activated) = hotkey_rx.recv() => {
                debug!("Hotkey activated");
                controller.on_hotkey();
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }

            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
        }
    }

    controller.disable();
    info!("Indicator stopped");
    Ok(())
}

/// Report whether everpad is on the session bus.
pub async fn status() -> Result<(), DaemonError> {
    let (events, _) = mpsc::unbounded_channel();

    let running = match DbusBus::connect(events).await {
        Ok(bus) => bus.is_everpad_running().await.unwrap_or_else(|e| {
            debug!("Name query failed: {}", e);
            false
        }),
        Err(e) => {
            debug!("No session bus: {}", e);
            false
        }
    };

    if running {
        println!("everpad is running");
    } else {
        println!("everpad is not running");
    }

    Ok(())
}
