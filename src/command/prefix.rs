use super::{help::effective_prefix, require_manager, Command};
use crate::{context::Context, settings::Prefix};
use anyhow::Result;
use serenity::all::Message;

pub struct SetPrefix;

/// Prefixes can't contain letters, digits or whitespace, which would make ordinary chat look like
/// commands.
pub fn valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix
            .chars()
            .any(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
}

#[serenity::async_trait]
impl Command for SetPrefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("prefix [new|default] - show or change the command prefix (Manage Server)")
    }

    async fn run(&self, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
        let Some(guild_id) = msg.guild_id else {
            return Ok(());
        };
        let args = args.trim();

        if args.is_empty() {
            let prefix = effective_prefix(ctx, guild_id);
            msg.channel_id
                .say(ctx.cache_http, format!("The prefix here is `{}`", prefix))
                .await?;
            return Ok(());
        }

        if !require_manager(ctx, msg).await? {
            return Ok(());
        }

        if args.eq_ignore_ascii_case("default") {
            ctx.settings.remove(guild_id, Prefix).await?;
        } else if valid_prefix(args) {
            ctx.settings.set(guild_id, Prefix, args.to_owned()).await?;
        } else {
            msg.channel_id
                .say(
                    ctx.cache_http,
                    "Invalid prefix. Can't be a letter, number, or whitespace character.",
                )
                .await?;
            return Ok(());
        }

        msg.channel_id.say(ctx.cache_http, "\\o/").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_make_valid_prefixes() {
        assert!(valid_prefix("!"));
        assert!(valid_prefix("~~"));
        assert!(valid_prefix("$>"));
    }

    #[test]
    fn rejects_letters_digits_and_whitespace() {
        assert!(!valid_prefix(""));
        assert!(!valid_prefix("a"));
        assert!(!valid_prefix("!1"));
        assert!(!valid_prefix("! "));
        assert!(!valid_prefix("!\n"));
    }
}
