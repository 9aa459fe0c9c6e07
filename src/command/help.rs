use super::Command;
use crate::{context::Context, settings::Prefix};
use anyhow::Result;
use serenity::all::{GuildId, Message};

pub struct Help;

/// The introduction and command listing, spelled with `prefix`.
pub fn help_message(ctx: &Context<'_>, prefix: &str) -> String {
    let mut help = format!(
        "**LISTEN.moe streaming bot**\n\n\
         **Usage:**\n    \
         After adding me to your server, join a voice channel and type `{prefix}join` to bind me \
         to that channel. You need the `Manage Server` permission to use this command.\n\n\
         **Commands:**\n"
    );
    for (_, command) in ctx.router.commands() {
        let Some(usage) = command.usage() else {
            continue;
        };
        let line = match usage.split_once(" - ") {
            Some((syntax, description)) => {
                format!("    `{}{}` - {}\n", prefix, syntax, description)
            }
            None => format!("    `{}{}`\n", prefix, usage),
        };
        help.push_str(&line);
    }
    help
}

/// Prefix in effect for `guild_id`
pub fn effective_prefix(ctx: &Context<'_>, guild_id: GuildId) -> String {
    ctx.settings
        .get(guild_id, Prefix, ctx.router.default_prefix().to_owned())
}

#[serenity::async_trait]
impl Command for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("help - show this message")
    }

    async fn run(&self, ctx: &Context, msg: &Message, _args: &str) -> Result<()> {
        let prefix = match msg.guild_id {
            Some(guild_id) => effective_prefix(ctx, guild_id),
            None => ctx.router.default_prefix().to_owned(),
        };
        msg.channel_id
            .say(ctx.cache_http, help_message(ctx, &prefix))
            .await?;
        Ok(())
    }
}
