use anyhow::{anyhow, Result};
use serenity::all::UserId;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

const CONFIG_DIR_REL_HOME: &str = ".config/listenbot";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "settings.db";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub stream: Stream,
    #[serde(default)]
    pub storage: Storage,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    #[serde(default)]
    pub bot_owners: Vec<UserId>,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Enables the owner-only `eval` command, which runs arbitrary shell scripts on the host.
    #[serde(default)]
    pub unsafe_eval: bool,
    /// Fixed shard count.  Discord's recommendation is used when absent.
    #[serde(default)]
    pub shards: Option<u32>,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Stream {
    /// Audio stream relayed into every voice connection
    pub url: String,
    /// Websocket publishing now-playing updates
    pub info_url: String,
    #[serde(default)]
    pub listeners_report_url: Option<String>,
    /// Goes between artist and song name in the bot's presence
    #[serde(default = "default_separator")]
    pub separator: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Pause between guilds when rejoining voice channels at startup
    #[serde(default = "default_rejoin_delay_ms")]
    pub rejoin_delay_ms: u64,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            database: None,
            rejoin_delay_ms: default_rejoin_delay_ms(),
        }
    }
}

fn default_command_prefix() -> String {
    "~~".to_owned()
}

fn default_separator() -> String {
    "-".to_owned()
}

fn default_rejoin_delay_ms() -> u64 {
    1000
}

fn config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(CONFIG_DIR_REL_HOME))
        .ok_or(anyhow!("Could not find home directory"))
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;

        if config.general.command_prefix.is_empty() {
            return Err(anyhow!("`general.command_prefix` must not be empty"));
        }

        Ok(config)
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.general.bot_owners.contains(&user_id)
    }
}

impl Storage {
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => config_dir().map(|dir| dir.join(DATABASE_FILE)),
        }
    }
}
