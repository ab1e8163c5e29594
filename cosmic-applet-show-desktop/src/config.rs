// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use cosmic::cosmic_config::{self, CosmicConfigEntry, cosmic_config_derive::CosmicConfigEntry};
use serde::{Deserialize, Serialize};

pub const APP_ID: &str = "com.system76.CosmicAppletShowDesktop";

#[derive(Debug, Clone, Serialize, Deserialize, CosmicConfigEntry, PartialEq, Eq)]
#[version = 1]
pub struct ShowDesktopConfig {
    /// Icon of the panel button.
    pub icon_name: String,
    /// Focus the previously active window again when restoring.
    pub restore_focus: bool,
}

impl Default for ShowDesktopConfig {
    fn default() -> Self {
        Self {
            icon_name: "user-desktop-symbolic".to_string(),
            restore_focus: true,
        }
    }
}

impl ShowDesktopConfig {
    pub fn load() -> Self {
        cosmic_config::Config::new(APP_ID, Self::VERSION)
            .ok()
            .and_then(|c| Self::get_entry(&c).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_restore_focus_with_desktop_icon() {
        let config = ShowDesktopConfig::default();
        assert_eq!(config.icon_name, "user-desktop-symbolic");
        assert!(config.restore_focus);
    }
}
