use super::{require_manager, Command};
use crate::{context::Context, helper::MessageHelper, log_internal, settings::VoiceChannel};
use anyhow::Result;
use serenity::all::Message;

/// Binds the guild to the author's voice channel and starts playing there.
pub struct Join;

#[serenity::async_trait]
impl Command for Join {
    fn name(&self) -> &'static str {
        "join"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("join - play the radio in your current voice channel (Manage Server)")
    }

    async fn run(&self, ctx: &Context, msg: &Message, _args: &str) -> Result<()> {
        if !require_manager(ctx, msg).await? {
            return Ok(());
        }

        let (Some(guild_id), Some(channel_id)) = (msg.guild_id, msg.author_voice_channel(ctx))
        else {
            msg.channel_id
                .say(ctx.cache_http, "Join a voice channel first!")
                .await?;
            return Ok(());
        };

        ctx.settings.set(guild_id, VoiceChannel, channel_id).await?;
        log_internal!("Guild {} bound to voice channel {}", guild_id, channel_id);

        ctx.voice
            .join_or_retry(ctx.settings, guild_id, channel_id, ctx.lifecycle.shutdown())
            .await;
        msg.channel_id.say(ctx.cache_http, "\\o/").await?;
        Ok(())
    }
}
