use crate::{
    command::{effective_prefix, help_message},
    event::*,
    log_error,
    plugin::*,
    settings::GuildDirectory,
};
use anyhow::Result;

/// Keeps stored settings in step with the guilds the bot is in.
pub struct Guilds;

#[serenity::async_trait]
impl Plugin for Guilds {
    fn name(&self) -> &'static str {
        "guilds"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::GuildCreate {
                guild,
                is_new: Some(true),
            } => {
                let Some(channel_id) = guild.system_channel_id else {
                    return Ok(EventHandled::No);
                };
                let help = help_message(ctx, &effective_prefix(ctx, guild.id));
                if let Err(e) = channel_id.say(ctx.cache_http, help).await {
                    log_error!("Could not greet guild {}: {}", guild.id, e);
                }
            }
            // A guild coming back from an outage.  Those present at startup are set up there.
            Event::GuildCreate { guild, .. } => {
                if !ctx.settings.started() {
                    return Ok(EventHandled::No);
                }
                let settings = ctx.settings.guild(guild.id);
                let Some(settings) = settings.filter(|settings| !settings.is_empty()) else {
                    return Ok(EventHandled::No);
                };
                if ctx.voice.current_channel(guild.id).await.is_none() {
                    super::ready::DiscordDirectory { ctx }
                        .setup_guild(guild.id, &settings)
                        .await;
                }
            }
            Event::GuildDelete { incomplete, .. } if !incomplete.unavailable => {
                ctx.settings.clear(incomplete.id).await?;
                ctx.voice.leave(incomplete.id).await?;
            }
            _ => {}
        }

        Ok(EventHandled::No)
    }
}
