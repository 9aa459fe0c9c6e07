use super::{require_manager, Command};
use crate::{context::Context, settings::VoiceChannel};
use anyhow::Result;
use serenity::all::Message;

pub struct Leave;

#[serenity::async_trait]
impl Command for Leave {
    fn name(&self) -> &'static str {
        "leave"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("leave - stop playing and leave voice (Manage Server)")
    }

    async fn run(&self, ctx: &Context, msg: &Message, _args: &str) -> Result<()> {
        if !require_manager(ctx, msg).await? {
            return Ok(());
        }
        let Some(guild_id) = msg.guild_id else {
            return Ok(());
        };

        // Unbind first so a pending rejoin gives up
        let was_bound = ctx.settings.remove(guild_id, VoiceChannel).await?.is_some();
        let was_connected = ctx.voice.leave(guild_id).await?;

        let reply = if was_connected || was_bound {
            ";_; o-okay..."
        } else {
            "Bot is not in a channel!"
        };
        msg.channel_id.say(ctx.cache_http, reply).await?;
        Ok(())
    }
}
