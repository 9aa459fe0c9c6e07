use crate::{
    event::*,
    lifecycle::pause,
    log_error, log_internal,
    plugin::*,
    radio::Radio,
    settings::{GuildDirectory, GuildSettings},
};
use anyhow::Result;
use serenity::all::{ActivityData, GuildId};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

const SONG_PRESENCE: Duration = Duration::from_secs(20);
const AUDIENCE_PRESENCE: Duration = Duration::from_secs(10);

/// Starts everything that has to wait for the connection to Discord: background tasks, presence
/// rotation, and, once every shard has connected and every guild is cached, settings startup.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let shard = ctx.cache_http.shard_id.0;

        match event {
            Event::Ready(ready) => {
                if ctx.lifecycle.claim_background_tasks() {
                    spawn_background_tasks(ctx);
                }

                if ctx.lifecycle.claim_presence(shard) {
                    let discord_ctx = ctx.cache_http.clone();
                    let radio = Arc::clone(ctx.radio);
                    let separator = ctx.cfg.stream.separator.clone();
                    let shutdown = ctx.lifecycle.shutdown().clone();
                    tokio::spawn(async move {
                        rotate_presence(discord_ctx, radio, separator, shutdown).await
                    });
                }

                ctx.lifecycle.shard_ready(shard);
                // Covers the last shard connecting with no guilds, which fires no cache_ready
                if ready.guilds.is_empty() {
                    startup(ctx).await?;
                }
            }
            Event::CacheReady(_) => startup(ctx).await?,
            _ => return Ok(EventHandled::No),
        }

        Ok(EventHandled::Yes)
    }
}

async fn startup(ctx: &Context<'_>) -> Result<()> {
    let guilds_pending = ctx.cache.unavailable_guilds().len() != 0;
    if !ctx
        .lifecycle
        .claim_startup(ctx.cache.shard_count(), guilds_pending)
    {
        return Ok(());
    }

    log_internal!("All shards cached, starting up guild settings");
    let result = ctx.settings.startup(&DiscordDirectory { ctx }).await;
    if result.is_err() {
        // Let the next cache_ready try again
        ctx.lifecycle.release_startup();
    }
    result
}

fn spawn_background_tasks(ctx: &Context) {
    let shutdown = ctx.lifecycle.shutdown();

    {
        let radio = Arc::clone(ctx.radio);
        let url = ctx.cfg.stream.info_url.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { radio.follow_status(&url, &shutdown).await });
    }

    {
        let radio = Arc::clone(ctx.radio);
        let cache = Arc::clone(ctx.cache);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { radio.tally_listeners(&cache, &shutdown).await });
    }

    if let Some(url) = ctx.cfg.stream.listeners_report_url.clone() {
        let radio = Arc::clone(ctx.radio);
        let http = ctx.lifecycle.http().clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { radio.report_listeners(&http, &url, &shutdown).await });
    }
}

/// Alternates the bot's activity between the current song and its audience.
async fn rotate_presence(
    discord_ctx: serenity::all::Context,
    radio: Arc<Radio>,
    separator: String,
    shutdown: CancellationToken,
) {
    loop {
        let song = radio
            .now_playing()
            .map(|now_playing| now_playing.activity(&separator))
            .unwrap_or_else(|| "music probably".to_owned());
        discord_ctx.set_activity(Some(ActivityData::playing(song)));
        if !pause(&shutdown, SONG_PRESENCE).await {
            return;
        }

        let audience = format!(
            "for {} on {} servers",
            radio.listeners(),
            discord_ctx.cache.guild_count()
        );
        discord_ctx.set_activity(Some(ActivityData::playing(audience)));
        if !pause(&shutdown, AUDIENCE_PRESENCE).await {
            return;
        }
    }
}

/// The Discord side of settings startup: which guilds the bot is in, and how to bring a guild
/// back to its stored state.
pub(super) struct DiscordDirectory<'a> {
    pub ctx: &'a Context<'a>,
}

#[serenity::async_trait]
impl GuildDirectory for DiscordDirectory<'_> {
    fn known_guilds(&self) -> HashSet<GuildId> {
        self.ctx.cache.guilds().into_iter().collect()
    }

    async fn setup_guild(&self, guild_id: GuildId, settings: &GuildSettings) {
        let ctx = self.ctx;
        let Some(channel_id) = settings.voice_channel else {
            return;
        };

        let channel_exists = ctx
            .cache
            .guild(guild_id)
            .is_some_and(|guild| guild.channels.contains_key(&channel_id));
        if !channel_exists {
            log_error!(
                "Voice channel {} of guild {} no longer exists, not rejoining",
                channel_id,
                guild_id
            );
            return;
        }

        ctx.voice
            .join_or_retry(ctx.settings, guild_id, channel_id, ctx.lifecycle.shutdown())
            .await;
    }
}
