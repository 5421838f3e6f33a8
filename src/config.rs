use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
}

fn default_listen_addr() -> String {
    "127.0.0.1:5005".to_string()
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the path in `JUKEBOX_CONFIG`, falling
    /// back to `jukebox.yaml` in the working directory. A missing file
    /// yields the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("JUKEBOX_CONFIG")
            .unwrap_or_else(|_| "jukebox.yaml".to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_yaml::from_str(&contents)
                .with_context(|| format!("invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(anyhow::Error::new(e)
                    .context(format!("failed to read config file {}", path.display())))
            }
        }
    }
}
