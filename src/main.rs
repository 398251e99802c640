//! zoom-by-scroll: zoom the screen magnifier by scrolling while holding a
//! modifier combination.
//!
//! `run` (the default) grabs input system-wide, turns modifier+scroll into
//! magnifier zoom changes, and restores the desktop settings it touched when
//! it exits. Status and control go over JSON lines on stdin/stdout.

mod bridge;
mod capture;
mod config;
mod controller;
mod event;
mod gesture;
mod ipc;
mod logger;
mod session;
mod store;
mod surface;
mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use bridge::SettingsBridge;
use config::ExtensionSettings;
use controller::{Action, ControllerConfig, ZoomController};
use gesture::ActivationGesture;
use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{DaemonCommand, DaemonEvent};
use session::{SessionOptions, ZoomSession};
use store::{GsettingsStore, MemoryStore, SettingsStore, SystemKey};
use surface::CaptureStage;
use workspace::{WmctrlWorkspaces, WorkspaceSwitcher};

#[derive(Parser)]
#[command(name = "zoom-by-scroll", version, about)]
struct Cli {
    /// Settings file (default: $XDG_CONFIG_HOME/zoom-by-scroll/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the zoom daemon (default)
    Run {
        /// Keep magnifier settings in memory instead of writing GSettings
        #[arg(long)]
        dry_run: bool,
        /// Do not read commands from stdin or print events to stdout
        #[arg(long)]
        no_ipc: bool,
        /// Disable the alternate-modifier workspace switch
        #[arg(long)]
        no_workspaces: bool,
    },
    /// Store the modifier combination that activates zooming
    SetModifier {
        /// One of the tokens printed by `list-modifiers`
        token: String,
    },
    /// List the available modifier combinations
    ListModifiers,
    /// Print the current settings and zoom factor
    Show,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let bridge = match cli.settings {
        Some(path) => SettingsBridge::new(path),
        None => SettingsBridge::default_location(),
    };

    match cli.command.unwrap_or(Commands::Run {
        dry_run: false,
        no_ipc: false,
        no_workspaces: false,
    }) {
        Commands::Run {
            dry_run,
            no_ipc,
            no_workspaces,
        } => {
            logger::init();
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run(bridge, dry_run, !no_ipc, !no_workspaces))
        }
        Commands::SetModifier { token } => {
            logger::init_console();
            let gesture = ActivationGesture::from_token(&token).with_context(|| {
                format!(
                    "Unknown modifier '{}'. Use one of: {}",
                    token,
                    ActivationGesture::all()
                        .map(|g| g.token())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?;
            bridge.set_gesture(gesture)?;
            println!("Modifier set to {} ({})", gesture.token(), gesture.label());
            Ok(())
        }
        Commands::ListModifiers => {
            for gesture in ActivationGesture::all() {
                let combo = if gesture.is_single_modifier() { "" } else { "  (combination)" };
                println!("{:<12} {}{}", gesture.token(), gesture.label(), combo);
            }
            Ok(())
        }
        Commands::Show => {
            logger::init_console();
            let settings = bridge.settings();
            println!("settings file:  {}", bridge.path().display());
            let gesture = bridge.gesture();
            println!("modifier key:   {} ({})", gesture.token(), gesture.label());
            println!("escape policy:  {:?}", settings.escape_policy);
            println!("max zoom:       {}", settings.tuning.max_zoom);
            match GsettingsStore::new().read_double(SystemKey::MagFactor) {
                Ok(factor) => println!("zoom factor:    {}", factor),
                Err(e) => println!("zoom factor:    unavailable ({:#})", e),
            }
            Ok(())
        }
    }
}

async fn run(bridge: SettingsBridge, dry_run: bool, ipc: bool, workspaces: bool) -> anyhow::Result<()> {
    if ipc {
        emit_event(&DaemonEvent::Starting {});
    }

    let settings = bridge.settings();
    let gesture = settings.gesture();
    info!(?settings, path = %bridge.path().display(), "Settings loaded");

    let store: Arc<dyn SettingsStore> = if dry_run {
        info!("Dry run: magnifier settings kept in memory");
        Arc::new(MemoryStore::new())
    } else {
        let gsettings = GsettingsStore::new();
        gsettings.probe()?;
        Arc::new(gsettings)
    };

    let mut controller = ZoomController::new(store.clone(), gesture, ControllerConfig::from(&settings));
    if workspaces && settings.workspace_modifier.is_some() {
        let wmctrl = WmctrlWorkspaces::new();
        match wmctrl.count() {
            Ok(count) => {
                info!(count, "Workspace switching available");
                controller = controller.with_workspaces(Arc::new(wmctrl));
            }
            Err(e) => warn!(error = %format!("{:#}", e), "Workspace switching unavailable"),
        }
    }
    if ipc {
        controller = controller.with_notifier(Box::new(|action: &Action| emit_event(&action.into())));
    }
    let controller = Arc::new(controller);

    let stage = Arc::new(CaptureStage::new("global-grab"));
    let mut session = ZoomSession::enable(
        store,
        controller,
        SessionOptions {
            avoid_wm_conflict: settings.avoid_wm_conflict,
        },
        stage.clone(),
        None,
    )?;

    // The session owns the overrides, so reloads are applied on this task
    let (settings_tx, mut settings_rx) = mpsc::unbounded_channel::<ExtensionSettings>();
    let watch = bridge.on_gesture_changed(move |settings| {
        let _ = settings_tx.send(settings.clone());
    });
    match watch {
        Ok(handle) => session.set_watch(handle),
        Err(e) => warn!(error = %format!("{:#}", e), "Settings changes will need a restart"),
    }

    let mut grab_failed = capture::spawn_grab(stage)?;

    if ipc {
        emit_event(&DaemonEvent::Ready {
            gesture: gesture.token().to_string(),
        });
    }
    info!(%gesture, "Zoom daemon ready");

    let mut cmd_rx = if ipc { Some(spawn_stdin_reader()) } else { None };
    let mut failure = None;
    loop {
        tokio::select! {
            outcome = &mut grab_failed => {
                let e = outcome.unwrap_or_else(|_| anyhow::anyhow!("Input grab thread exited"));
                error!("Input capture lost: {:#}", e);
                if ipc {
                    emit_error(&format!("Input capture lost: {:#}", e));
                }
                failure = Some(e);
                break;
            }
            Some(settings) = settings_rx.recv() => {
                session.apply_settings(&settings);
                if ipc {
                    emit_event(&DaemonEvent::GestureChanged {
                        gesture: settings.gesture().token().to_string(),
                    });
                }
            }
            cmd = next_command(&mut cmd_rx) => {
                match cmd {
                    Some(command) => {
                        if !handle_command(command, &session, &bridge) {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if ipc {
        emit_event(&DaemonEvent::Stopping {});
    }
    session.disable();
    info!("Zoom daemon stopped");
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Next IPC command, or never when IPC is off.
async fn next_command(rx: &mut Option<mpsc::UnboundedReceiver<DaemonCommand>>) -> Option<DaemonCommand> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Handle a single IPC command.
/// Returns `false` if the main loop should exit.
fn handle_command(cmd: DaemonCommand, session: &ZoomSession, bridge: &SettingsBridge) -> bool {
    let controller = session.controller();
    match cmd {
        DaemonCommand::Ping {} => emit_event(&DaemonEvent::Pong {}),

        DaemonCommand::Stop {} => return false,

        DaemonCommand::Status {} => {
            let gesture = ActivationGesture::all()
                .find(|g| g.required_mask() == controller.required_mask())
                .unwrap_or_default();
            emit_event(&DaemonEvent::Status {
                active: session.is_active(),
                gesture: gesture.token().to_string(),
                factor: controller.zoom_factor().ok(),
                subscriptions: session.subscription_count(),
            });
        }

        // The notifier reports the reset itself
        DaemonCommand::ResetZoom {} => {
            if let Err(e) = controller.reset_zoom() {
                error!("Zoom reset failed: {:#}", e);
                emit_error(&format!("Zoom reset failed: {:#}", e));
            }
        }

        DaemonCommand::SetModifierKey { key } => match ActivationGesture::from_token(&key) {
            // The settings watcher applies it to the controller
            Some(gesture) => {
                if let Err(e) = bridge.set_gesture(gesture) {
                    error!("Failed to save modifier key: {:#}", e);
                    emit_error(&format!("Failed to save modifier key: {:#}", e));
                }
            }
            None => emit_error(&format!("Unknown modifier key: {}", key)),
        },
    }

    true
}
