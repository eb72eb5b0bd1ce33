use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, path::PathBuf, time::Duration};

pub const CONFIG_PATH_ENV: &str = "PLATES_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_folder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub idle_backoff_secs: u64,
    pub jpeg_quality: u8,
    pub event_capacity: usize,
}

impl Settings {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.max_upload_bytes", 25 * 1024 * 1024_i64)?
            .set_default("storage.data_folder", "data")?
            .set_default("processing.idle_backoff_secs", 5)?
            .set_default("processing.jpeg_quality", 85)?
            .set_default("processing.event_capacity", 256)?
            .add_source(config::File::from(config_path).required(false))
            .add_source(config::Environment::with_prefix("PLATES").separator("__"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Directory holding original and derived image files.
    pub fn images_dir(&self) -> PathBuf {
        self.storage.data_folder.join("plates")
    }

    pub fn database_file(&self) -> PathBuf {
        self.storage.data_folder.join("plates.db")
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.processing.idle_backoff_secs)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = env::var("PLATES__SERVER_HOST") {
            self.server.host = value;
        }
        if let Ok(value) = env::var("PLATES__SERVER_PORT") {
            self.server.port = value
                .parse()
                .context("PLATES__SERVER_PORT must be a valid u16")?;
        }
        if let Ok(value) = env::var("DATA_FOLDER") {
            self.storage.data_folder = PathBuf::from(value);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be greater than zero");
        }
        if self.storage.data_folder.as_os_str().is_empty() {
            anyhow::bail!("storage.data_folder must not be empty");
        }
        if self.processing.idle_backoff_secs == 0 {
            anyhow::bail!("processing.idle_backoff_secs must be at least 1");
        }
        if self.processing.jpeg_quality == 0 || self.processing.jpeg_quality > 100 {
            anyhow::bail!("processing.jpeg_quality must be between 1 and 100");
        }
        if self.processing.event_capacity == 0 {
            anyhow::bail!("processing.event_capacity must be greater than zero");
        }
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    Ok(cwd.join("config").join("server").join("default.toml"))
}
