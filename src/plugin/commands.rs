use crate::{
    event::*,
    helper::MessageHelper,
    log_event,
    logging::*,
    plugin::*,
    settings::{self, Prefix},
};
use anyhow::Result;
use serenity::all::Message;

/// Hands prefixed messages to the router.  Commands in ignored channels are dropped unless the
/// command is privileged or the author is.
pub struct Commands;

#[serenity::async_trait]
impl Plugin for Commands {
    fn name(&self) -> &'static str {
        "commands"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };
        let Some(guild_id) = msg.guild_id else {
            return Ok(EventHandled::No);
        };
        // Writing before the stored settings are in memory would replace them
        if !ctx.settings.loaded() {
            return Ok(EventHandled::No);
        }

        let prefix = ctx.settings.lookup(guild_id, Prefix);
        let outcome = ctx
            .router
            .process(&msg.content, prefix.as_deref(), |command, args| async move {
                if suppressed(
                    channel_ignored(ctx, msg),
                    command.privileged(),
                    msg.is_privileged(ctx),
                ) {
                    return Ok(());
                }

                let channel = msg.channel_id.color(ctx.http).await;
                log_event!(
                    "{}{}{} ran `{}` in {}",
                    msg.author.color(),
                    Glue.color(),
                    channel,
                    command.name(),
                    guild_id.color(ctx.cache),
                );
                command.run(ctx, msg, args).await
            })
            .await;

        match outcome {
            Some(result) => result.map(|()| EventHandled::Yes),
            None => Ok(EventHandled::No),
        }
    }
}

fn channel_ignored(ctx: &Context<'_>, msg: &Message) -> bool {
    let Some(guild_id) = msg.guild_id else {
        return false;
    };
    ctx.settings
        .lookup(guild_id, settings::Ignore)
        .is_some_and(|ignored| ignored.contains(&msg.channel_id))
}

/// Whether a command is dropped.  The ignore list binds neither privileged commands nor
/// privileged authors.
fn suppressed(channel_ignored: bool, command_privileged: bool, author_privileged: bool) -> bool {
    channel_ignored && !command_privileged && !author_privileged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_channel_drops_ordinary_commands_from_ordinary_users() {
        assert!(suppressed(true, false, false));
    }

    #[test]
    fn privileged_commands_and_authors_bypass_ignore_list() {
        assert!(!suppressed(true, true, false));
        assert!(!suppressed(true, false, true));
        assert!(!suppressed(true, true, true));
    }

    #[test]
    fn nothing_is_dropped_outside_ignored_channels() {
        for command_privileged in [false, true] {
            for author_privileged in [false, true] {
                assert!(!suppressed(false, command_privileged, author_privileged));
            }
        }
    }
}
