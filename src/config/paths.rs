//! Settings and log directory paths.
//!
//!   Settings: $XDG_CONFIG_HOME/zoom-by-scroll (default ~/.config/zoom-by-scroll)
//!   Logs:     $XDG_DATA_HOME/zoom-by-scroll/logs (default ~/.local/share/...)

use std::path::PathBuf;

const APP_DIR: &str = "zoom-by-scroll";

/// Directory holding `settings.json`.
pub fn get_config_dir() -> PathBuf {
    get_config_base().join(APP_DIR)
}

/// Directory for rolling log files.
pub fn get_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR)
        .join("logs")
}

fn get_config_base() -> PathBuf {
    // Respect XDG_CONFIG_HOME even where `dirs` would not
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg);
    }
    dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    })
}
