//! Per-guild settings, cached in memory and written through to a single SQLite table.
//!
//! Reads never touch the database.  Every mutation updates the in-memory record first and then
//! rewrites the guild's whole row, so a failed write leaves memory ahead of the database until the
//! next successful write for that guild.

use crate::{log_error, log_internal};
use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock};
use serenity::all::{ChannelId, GuildId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

/// Options a guild can override.  Missing fields fall back to process-wide defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, alias = "vc", skip_serializing_if = "Option::is_none")]
    pub voice_channel: Option<ChannelId>,
    #[serde(default, alias = "denied", skip_serializing_if = "HashSet::is_empty")]
    pub ignore: HashSet<ChannelId>,
}

impl GuildSettings {
    pub fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.voice_channel.is_none() && self.ignore.is_empty()
    }
}

/// A typed handle on one field of [`GuildSettings`].
pub trait SettingKey {
    type Value: Clone + Send;

    const NAME: &'static str;

    fn read(settings: &GuildSettings) -> Option<Self::Value>;

    /// Stores `value` (or unsets the field for `None`) and returns what was there before.
    fn write(settings: &mut GuildSettings, value: Option<Self::Value>) -> Option<Self::Value>;
}

pub struct Prefix;
pub struct VoiceChannel;
pub struct Ignore;

impl SettingKey for Prefix {
    type Value = String;
    const NAME: &'static str = "prefix";

    fn read(settings: &GuildSettings) -> Option<String> {
        settings.prefix.clone()
    }

    fn write(settings: &mut GuildSettings, value: Option<String>) -> Option<String> {
        std::mem::replace(&mut settings.prefix, value)
    }
}

impl SettingKey for VoiceChannel {
    type Value = ChannelId;
    const NAME: &'static str = "voiceChannel";

    fn read(settings: &GuildSettings) -> Option<ChannelId> {
        settings.voice_channel
    }

    fn write(settings: &mut GuildSettings, value: Option<ChannelId>) -> Option<ChannelId> {
        std::mem::replace(&mut settings.voice_channel, value)
    }
}

// An empty ignore list counts as unset.
impl SettingKey for Ignore {
    type Value = HashSet<ChannelId>;
    const NAME: &'static str = "ignore";

    fn read(settings: &GuildSettings) -> Option<HashSet<ChannelId>> {
        (!settings.ignore.is_empty()).then(|| settings.ignore.clone())
    }

    fn write(
        settings: &mut GuildSettings,
        value: Option<HashSet<ChannelId>>,
    ) -> Option<HashSet<ChannelId>> {
        let previous = std::mem::replace(&mut settings.ignore, value.unwrap_or_default());
        (!previous.is_empty()).then_some(previous)
    }
}

/// What the store needs from the Discord side during [`SettingsStore::startup`].
#[serenity::async_trait]
pub trait GuildDirectory: Send + Sync {
    /// Every guild the bot is currently in, across all shards.
    fn known_guilds(&self) -> HashSet<GuildId>;

    /// Re-applies the side effects of a guild's stored settings, e.g. rejoining its voice channel.
    async fn setup_guild(&self, guild_id: GuildId, settings: &GuildSettings);
}

pub struct SettingsStore {
    pool: SqlitePool,
    settings: RwLock<HashMap<GuildId, GuildSettings>>,
    write_locks: Mutex<HashMap<GuildId, Arc<tokio::sync::Mutex<()>>>>,
    setup_delay: Duration,
    loaded: AtomicBool,
    started: AtomicBool,
}

/// Opens (creating if needed) the settings database at `path`.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            anyhow!(
                "Could not create directory `{}`: {}",
                parent.to_string_lossy(),
                e
            )
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            anyhow!(
                "Could not open settings database at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

    // Commands may write before startup has run
    create_table(&pool).await?;
    Ok(pool)
}

async fn create_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS guilds (guild INTEGER PRIMARY KEY, settings TEXT)")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| anyhow!("Could not create settings table: {}", e))
}

fn row_key(guild_id: GuildId) -> Result<i64> {
    i64::try_from(guild_id.get())
        .map_err(|_| anyhow!("Guild id {} does not fit a row key", guild_id))
}

impl SettingsStore {
    /// `setup_delay` throttles [`GuildDirectory::setup_guild`] calls during startup so that
    /// Discord's voice handshake isn't flooded.
    pub fn new(pool: SqlitePool, setup_delay: Duration) -> Self {
        Self {
            pool,
            settings: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            setup_delay,
            loaded: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    /// Value stored for `key`, or `default`.
    pub fn get<K: SettingKey>(&self, guild_id: GuildId, key: K, default: K::Value) -> K::Value {
        self.lookup(guild_id, key).unwrap_or(default)
    }

    pub fn lookup<K: SettingKey>(&self, guild_id: GuildId, _key: K) -> Option<K::Value> {
        self.settings.read().get(&guild_id).and_then(K::read)
    }

    /// Snapshot of a guild's whole record
    pub fn guild(&self, guild_id: GuildId) -> Option<GuildSettings> {
        self.settings.read().get(&guild_id).cloned()
    }

    pub async fn set<K: SettingKey>(
        &self,
        guild_id: GuildId,
        key: K,
        value: K::Value,
    ) -> Result<K::Value> {
        let stored = value.clone();
        self.update(guild_id, key, |_| Some(value)).await?;
        Ok(stored)
    }

    /// Unsets `key`.  The guild's record survives even if it ends up empty; see [`Self::clear`].
    pub async fn remove<K: SettingKey>(
        &self,
        guild_id: GuildId,
        _key: K,
    ) -> Result<Option<K::Value>> {
        let lock = self.write_lock(guild_id);
        let _guard = lock.lock().await;

        let (previous, payload) = {
            let mut settings = self.settings.write();
            let Some(record) = settings.get_mut(&guild_id) else {
                return Ok(None);
            };
            if K::read(record).is_none() {
                return Ok(None);
            }
            let previous = K::write(record, None);
            (previous, serde_json::to_string(record)?)
        };

        self.persist(guild_id, K::NAME, &payload).await?;
        Ok(previous)
    }

    /// Read-modify-write of one key, serialized against other writes to the same guild.  `f`
    /// returning `None` unsets the key.  Returns the new value.
    pub async fn update<K, F>(&self, guild_id: GuildId, _key: K, f: F) -> Result<Option<K::Value>>
    where
        K: SettingKey,
        F: FnOnce(Option<K::Value>) -> Option<K::Value>,
    {
        let lock = self.write_lock(guild_id);
        let _guard = lock.lock().await;

        let (value, payload) = {
            let mut settings = self.settings.write();
            let record = settings.entry(guild_id).or_default();
            let value = f(K::read(record));
            K::write(record, value);
            (K::read(record), serde_json::to_string(record)?)
        };

        self.persist(guild_id, K::NAME, &payload).await?;
        Ok(value)
    }

    /// Forgets the guild entirely, in memory and on disk.
    pub async fn clear(&self, guild_id: GuildId) -> Result<()> {
        let lock = self.write_lock(guild_id);
        let _guard = lock.lock().await;

        if self.settings.write().remove(&guild_id).is_none() {
            return Ok(());
        }

        self.delete_row(guild_id).await
    }

    /// Reads every stored guild into memory.  Runs before anything can write, so no row is ever
    /// replaced by a record that wasn't loaded first.  Later calls return immediately.
    pub async fn load(&self) -> Result<()> {
        if self.loaded() {
            return Ok(());
        }

        create_table(&self.pool).await?;

        let rows: Vec<(i64, Option<String>)> =
            sqlx::query_as("SELECT guild, settings FROM guilds")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| anyhow!("Could not load guild settings: {}", e))?;

        let mut loaded = HashMap::new();
        for (row, payload) in rows {
            let Some(guild_id) = u64::try_from(row).ok().filter(|id| *id != 0).map(GuildId::new)
            else {
                log_error!("Skipping settings row with invalid guild id {}", row);
                continue;
            };

            let payload = payload.as_deref().unwrap_or("{}");
            match serde_json::from_str::<GuildSettings>(payload) {
                Ok(settings) => {
                    loaded.insert(guild_id, settings);
                }
                Err(e) => log_error!("Skipping corrupt settings for guild {}: {}", guild_id, e),
            }
        }

        {
            let mut settings = self.settings.write();
            for (guild_id, record) in loaded {
                settings.entry(guild_id).or_insert(record);
            }
        }
        self.loaded.store(true, Ordering::SeqCst);

        log_internal!("Loaded settings for {} guild(s)", self.settings.read().len());
        Ok(())
    }

    /// Drops the guilds the bot is no longer in and replays the setup of the rest.  Loads first
    /// if [`Self::load`] hasn't run.  Runs at most once unless it fails.
    pub async fn startup<D>(&self, directory: &D) -> Result<()>
    where
        D: GuildDirectory + ?Sized,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.load().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let known = directory.known_guilds();
        let mut stored: Vec<GuildId> = self.settings.read().keys().copied().collect();
        stored.sort();

        let mut retained = Vec::new();
        for guild_id in stored {
            if known.contains(&guild_id) {
                if let Some(settings) = self.guild(guild_id) {
                    retained.push((guild_id, settings));
                }
                continue;
            }

            log_internal!("Purging settings of departed guild {}", guild_id);
            if let Err(e) = self.clear(guild_id).await {
                log_error!("{}", e);
            }
        }

        for (i, (guild_id, settings)) in retained.iter().enumerate() {
            if i > 0 && !self.setup_delay.is_zero() {
                tokio::time::sleep(self.setup_delay).await;
            }
            directory.setup_guild(*guild_id, settings).await;
        }

        Ok(())
    }

    /// Whether stored settings are in memory yet
    pub fn loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Whether [`Self::startup`] has begun
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    fn write_lock(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<()>> {
        self.write_locks.lock().entry(guild_id).or_default().clone()
    }

    async fn persist(&self, guild_id: GuildId, key: &str, payload: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO guilds (guild, settings) VALUES (?, ?)")
            .bind(row_key(guild_id)?)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| {
                anyhow!(
                    "Could not save `{}` for guild {}: {}",
                    key,
                    guild_id,
                    e
                )
            })
    }

    async fn delete_row(&self, guild_id: GuildId) -> Result<()> {
        sqlx::query("DELETE FROM guilds WHERE guild = ?")
            .bind(row_key(guild_id)?)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Could not delete settings for guild {}: {}", guild_id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: u64 = 222078108977594368;
    const DEPARTED: u64 = 110373943822540800;

    struct Directory {
        known: HashSet<GuildId>,
        setups: Mutex<Vec<(GuildId, GuildSettings)>>,
    }

    impl Directory {
        fn new(known: &[u64]) -> Self {
            Self {
                known: known.iter().copied().map(GuildId::new).collect(),
                setups: Mutex::new(Vec::new()),
            }
        }
    }

    #[serenity::async_trait]
    impl GuildDirectory for Directory {
        fn known_guilds(&self) -> HashSet<GuildId> {
            self.known.clone()
        }

        async fn setup_guild(&self, guild_id: GuildId, settings: &GuildSettings) {
            self.setups.lock().push((guild_id, settings.clone()));
        }
    }

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn started_store() -> SettingsStore {
        let store = SettingsStore::new(memory_pool().await, Duration::ZERO);
        store.startup(&Directory::new(&[])).await.unwrap();
        store
    }

    async fn stored_row(store: &SettingsStore, guild_id: GuildId) -> Option<serde_json::Value> {
        let row: Option<(String,)> = sqlx::query_as("SELECT settings FROM guilds WHERE guild = ?")
            .bind(row_key(guild_id).unwrap())
            .fetch_optional(&store.pool)
            .await
            .unwrap();
        row.map(|(payload,)| serde_json::from_str(&payload).unwrap())
    }

    #[tokio::test]
    async fn unknown_guild_uses_default() {
        let store = started_store().await;
        assert_eq!(store.get(GuildId::new(KNOWN), Prefix, "~~".to_owned()), "~~");
        assert_eq!(store.lookup(GuildId::new(KNOWN), VoiceChannel), None);
    }

    #[tokio::test]
    async fn set_is_visible_and_persisted() {
        let store = started_store().await;
        let guild = GuildId::new(KNOWN);

        let stored = store.set(guild, Prefix, "!".to_owned()).await.unwrap();
        assert_eq!(stored, "!");
        assert_eq!(store.get(guild, Prefix, "~~".to_owned()), "!");

        let row = stored_row(&store, guild).await.unwrap();
        assert_eq!(row, serde_json::json!({ "prefix": "!" }));
    }

    #[tokio::test]
    async fn remove_restores_default() {
        let store = started_store().await;
        let guild = GuildId::new(KNOWN);

        store.set(guild, Prefix, "!".to_owned()).await.unwrap();
        let previous = store.remove(guild, Prefix).await.unwrap();
        assert_eq!(previous.as_deref(), Some("!"));
        assert_eq!(store.get(guild, Prefix, "~~".to_owned()), "~~");

        // The emptied record is kept until an explicit clear
        assert_eq!(store.guild(guild), Some(GuildSettings::default()));
        assert_eq!(stored_row(&store, guild).await, Some(serde_json::json!({})));

        assert_eq!(store.remove(guild, Prefix).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_removes_all_trace() {
        let store = started_store().await;
        let guild = GuildId::new(KNOWN);
        let channel = ChannelId::new(302015046337020956);

        store.set(guild, Prefix, "!".to_owned()).await.unwrap();
        store.set(guild, VoiceChannel, channel).await.unwrap();
        store.clear(guild).await.unwrap();

        assert_eq!(store.get(guild, Prefix, "~~".to_owned()), "~~");
        assert_eq!(store.lookup(guild, VoiceChannel), None);
        assert_eq!(store.guild(guild), None);
        assert_eq!(stored_row(&store, guild).await, None);

        // Clearing an absent guild is a no-op
        store.clear(guild).await.unwrap();
    }

    #[tokio::test]
    async fn update_edits_ignore_list() {
        let store = started_store().await;
        let guild = GuildId::new(KNOWN);
        let first = ChannelId::new(1);
        let second = ChannelId::new(2);

        for channel in [first, second] {
            store
                .update(guild, Ignore, |ignored| {
                    let mut ignored = ignored.unwrap_or_default();
                    ignored.insert(channel);
                    Some(ignored)
                })
                .await
                .unwrap();
        }
        let ignored = store.get(guild, Ignore, HashSet::new());
        assert_eq!(ignored, HashSet::from([first, second]));

        let remaining = store
            .update(guild, Ignore, |ignored| {
                let mut ignored = ignored.unwrap_or_default();
                ignored.remove(&first);
                Some(ignored)
            })
            .await
            .unwrap();
        assert_eq!(remaining, Some(HashSet::from([second])));

        let row = stored_row(&store, guild).await.unwrap();
        assert_eq!(row, serde_json::json!({ "ignore": ["2"] }));
    }

    #[tokio::test]
    async fn startup_keeps_only_known_guilds() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE guilds (guild INTEGER PRIMARY KEY, settings TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        for (guild, payload) in [
            (KNOWN, r#"{"prefix":"!","voiceChannel":"302015046337020956"}"#),
            (DEPARTED, r#"{"prefix":"?"}"#),
            (3, "{not json"),
        ] {
            sqlx::query("INSERT INTO guilds VALUES (?, ?)")
                .bind(guild as i64)
                .bind(payload)
                .execute(&pool)
                .await
                .unwrap();
        }

        let store = SettingsStore::new(pool, Duration::ZERO);
        let directory = Directory::new(&[KNOWN, 3]);
        store.startup(&directory).await.unwrap();

        let known = GuildId::new(KNOWN);
        assert_eq!(store.get(known, Prefix, "~~".to_owned()), "!");
        assert_eq!(
            store.lookup(known, VoiceChannel),
            Some(ChannelId::new(302015046337020956))
        );
        assert_eq!(store.guild(GuildId::new(DEPARTED)), None);
        assert_eq!(stored_row(&store, GuildId::new(DEPARTED)).await, None);

        // Corrupt rows are skipped, not purged
        assert_eq!(store.guild(GuildId::new(3)), None);
        let corrupt: Option<(String,)> = sqlx::query_as("SELECT settings FROM guilds WHERE guild = 3")
            .fetch_optional(&store.pool)
            .await
            .unwrap();
        assert!(corrupt.is_some());

        let setups = directory.setups.lock().clone();
        assert_eq!(setups.len(), 1);
        assert_eq!(setups[0].0, known);

        // A second startup does nothing
        store.startup(&Directory::new(&[])).await.unwrap();
        assert_eq!(store.get(known, Prefix, "~~".to_owned()), "!");
    }

    async fn seeded_pool(rows: &[(u64, &str)]) -> SqlitePool {
        let pool = memory_pool().await;
        create_table(&pool).await.unwrap();
        for (guild, payload) in rows {
            sqlx::query("INSERT INTO guilds VALUES (?, ?)")
                .bind(*guild as i64)
                .bind(*payload)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn writes_before_startup_keep_stored_fields() {
        let pool = seeded_pool(&[(
            KNOWN,
            r#"{"prefix":"!","voiceChannel":"302015046337020956"}"#,
        )])
        .await;
        let store = SettingsStore::new(pool, Duration::ZERO);
        store.load().await.unwrap();

        let guild = GuildId::new(KNOWN);
        assert_eq!(store.get(guild, Prefix, "~~".to_owned()), "!");
        store
            .set(guild, Ignore, HashSet::from([ChannelId::new(5)]))
            .await
            .unwrap();

        store.startup(&Directory::new(&[KNOWN])).await.unwrap();
        assert_eq!(store.get(guild, Prefix, "~~".to_owned()), "!");
        assert_eq!(
            store.lookup(guild, VoiceChannel),
            Some(ChannelId::new(302015046337020956))
        );
        assert_eq!(
            stored_row(&store, guild).await,
            Some(serde_json::json!({
                "prefix": "!",
                "voiceChannel": "302015046337020956",
                "ignore": ["5"],
            }))
        );
    }

    #[tokio::test]
    async fn failed_startup_can_be_retried() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE guilds (unrelated TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        let store = SettingsStore::new(pool, Duration::ZERO);

        assert!(store.startup(&Directory::new(&[KNOWN])).await.is_err());
        assert!(!store.started());
        assert!(!store.loaded());

        sqlx::query("DROP TABLE guilds").execute(&store.pool).await.unwrap();
        store.startup(&Directory::new(&[KNOWN])).await.unwrap();
        assert!(store.started());
        assert!(store.loaded());
    }

    #[test]
    fn legacy_keys_are_accepted() {
        let settings: GuildSettings =
            serde_json::from_str(r#"{"vc":"302015046337020956","denied":["1","2"]}"#).unwrap();
        assert_eq!(settings.voice_channel, Some(ChannelId::new(302015046337020956)));
        assert_eq!(settings.ignore.len(), 2);
        assert!(settings.prefix.is_none());
    }

    #[test]
    fn empty_settings_serialize_to_empty_object() {
        let settings = GuildSettings::default();
        assert!(settings.is_empty());
        assert_eq!(serde_json::to_string(&settings).unwrap(), "{}");
    }
}
