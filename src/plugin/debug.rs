use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Shard {} connected to {} server(s) as {}",
                    ctx.cache_http.shard_id.0,
                    ready.guilds.len(),
                    ctx.cache.current_user().color(),
                );
            }
            Event::CacheReady(guilds) => {
                log_event!(
                    "Shard {} cached {} server(s)",
                    ctx.cache_http.shard_id.0,
                    guilds.len()
                );
            }
            Event::GuildCreate {
                guild,
                is_new: Some(true),
            } => {
                log_event!("Joined server {}", guild.color());
            }
            Event::GuildDelete { incomplete, full } => {
                let name = match full {
                    Some(guild) => guild.color(),
                    None => incomplete.id.color(ctx.cache),
                };
                if incomplete.unavailable {
                    log_event!("Server {} became unavailable", name);
                } else {
                    log_event!("Removed from server {}", name);
                }
            }
            Event::VoiceStateUpdate { old, new } if new.user_id == ctx.cache.current_user().id => {
                let Some(guild_id) = new.guild_id else {
                    return Ok(EventHandled::No);
                };
                let old_channel = old.as_ref().and_then(|old| old.channel_id);
                match (old_channel, new.channel_id) {
                    (Some(old), Some(new)) if old == new => {
                        // State change within same channel, e.g. mute/unmute
                    }
                    (_, Some(channel_id)) => log_event!(
                        "Now in voice channel \"{}\" of {}",
                        channel_id.color(ctx.http).await,
                        guild_id.color(ctx.cache),
                    ),
                    (Some(_), None) => {
                        log_event!("Disconnected from voice in {}", guild_id.color(ctx.cache))
                    }
                    (None, None) => {}
                }
            }
            _ => {}
        }

        Ok(EventHandled::No)
    }
}
