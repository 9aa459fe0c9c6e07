use super::{require_manager, Command};
use crate::{context::Context, settings};
use anyhow::Result;
use serenity::all::{ChannelId, ChannelType, GuildId, Message};
use std::collections::HashSet;

pub struct Ignore;
pub struct Unignore;

/// Channels people can post commands in
fn accepts_commands(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Text | ChannelType::News)
}

fn text_channels(ctx: &Context<'_>, guild_id: GuildId) -> HashSet<ChannelId> {
    ctx.cache
        .guild(guild_id)
        .map(|guild| {
            guild
                .channels
                .values()
                .filter(|channel| accepts_commands(channel.kind))
                .map(|channel| channel.id)
                .collect()
        })
        .unwrap_or_default()
}

fn wants_all(args: &str) -> bool {
    args.trim().eq_ignore_ascii_case("all")
}

#[serenity::async_trait]
impl Command for Ignore {
    fn name(&self) -> &'static str {
        "ignore"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("ignore [all] - ignore commands in this channel, or every channel (Manage Server)")
    }

    async fn run(&self, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
        if !require_manager(ctx, msg).await? {
            return Ok(());
        }
        let Some(guild_id) = msg.guild_id else {
            return Ok(());
        };

        let added = if wants_all(args) {
            text_channels(ctx, guild_id)
        } else {
            HashSet::from([msg.channel_id])
        };

        ctx.settings
            .update(guild_id, settings::Ignore, |ignored| {
                let mut ignored = ignored.unwrap_or_default();
                ignored.extend(added);
                Some(ignored)
            })
            .await?;

        let reply = if wants_all(args) {
            "Ignoring commands in every channel. Server managers can still use them."
        } else {
            "Ignoring commands in this channel. Server managers can still use them."
        };
        msg.channel_id.say(ctx.cache_http, reply).await?;
        Ok(())
    }
}

#[serenity::async_trait]
impl Command for Unignore {
    fn name(&self) -> &'static str {
        "unignore"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("unignore [all] - accept commands in this channel again, or everywhere (Manage Server)")
    }

    async fn run(&self, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
        if !require_manager(ctx, msg).await? {
            return Ok(());
        }
        let Some(guild_id) = msg.guild_id else {
            return Ok(());
        };

        let reply = if wants_all(args) {
            ctx.settings.remove(guild_id, settings::Ignore).await?;
            "Accepting commands in every channel."
        } else {
            let channel_id = msg.channel_id;
            ctx.settings
                .update(guild_id, settings::Ignore, |ignored| {
                    let mut ignored = ignored?;
                    ignored.remove(&channel_id);
                    Some(ignored)
                })
                .await?;
            "Accepting commands in this channel."
        };
        msg.channel_id.say(ctx.cache_http, reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_case_insensitive() {
        assert!(wants_all("all"));
        assert!(wants_all(" ALL "));
        assert!(!wants_all(""));
        assert!(!wants_all("everything"));
    }

    #[test]
    fn all_covers_text_and_announcement_channels() {
        assert!(accepts_commands(ChannelType::Text));
        assert!(accepts_commands(ChannelType::News));
        assert!(!accepts_commands(ChannelType::Voice));
        assert!(!accepts_commands(ChannelType::Category));
    }
}
