use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "SHADER_BG_CONFIG_DIR";
pub const ENV_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";

const QUALIFIER: &str = "com";
const ORGANISATION: &str = "triadica";
const APPLICATION: &str = "shader-bg";
const SOCKET_NAME: &str = "shader-bg.sock";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    runtime_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let config_dir = match env_override(ENV_CONFIG_DIR) {
            Some(dir) => dir,
            None => ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
                .ok_or_else(|| anyhow!("failed to determine user directories"))?
                .config_dir()
                .to_path_buf(),
        };
        let runtime_dir = env_override(ENV_RUNTIME_DIR).unwrap_or_else(env::temp_dir);
        Ok(Self {
            config_dir,
            runtime_dir,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.config_dir.join("state.toml")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir.join(SOCKET_NAME)
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
