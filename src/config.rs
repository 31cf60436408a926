// smupdate - show and update SnapMirror relationships over ONTAP ZAPI
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::client::{ApiVersion, DEFAULT_PORT, Transport};
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Connection defaults; credentials are never read from here.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub verify_tls: Option<bool>,
    pub transport: Option<Transport>,
    pub port: Option<u16>,
    pub api_version: Option<ApiVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a config directory for the current user")]
    MissingConfigDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub verify_tls: bool,
    pub transport: Transport,
    pub port: u16,
    pub api_version: ApiVersion,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".smupdate.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("SMUPDATE_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("smupdate").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = match config_path(Scope::User, cwd) {
        Ok(path) => read_if_exists(&path)?.unwrap_or_default(),
        Err(_) => Config::default(),
    };
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

/// Merges both scopes; `insecure` forces certificate validation off.
pub fn resolve(cwd: &Path, insecure: bool) -> Result<EffectiveConfig> {
    let merged = load(cwd)?;
    Ok(EffectiveConfig {
        verify_tls: !insecure && merged.verify_tls.unwrap_or(true),
        transport: merged.transport.unwrap_or_default(),
        port: merged.port.unwrap_or(DEFAULT_PORT),
        api_version: merged.api_version.unwrap_or_default(),
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        verify_tls: local.verify_tls.or(user.verify_tls),
        transport: local.transport.or(user.transport),
        port: local.port.or(user.port),
        api_version: local.api_version.or(user.api_version),
    }
}
