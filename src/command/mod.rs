//! Chat commands.  Each one is registered with the router under its name.

use crate::{context::Context, helper::MessageHelper, router::Router};
use anyhow::Result;
use serenity::all::Message;

mod eval;
mod help;
mod ignore;
mod join;
mod leave;
mod np;
mod prefix;
mod stats;

pub use help::{effective_prefix, help_message};

const NOT_OWNER: &str = "soz bae must be bot owner";
const NOT_MANAGER: &str = "You need the `Manage Server` permission to do that.";

#[serenity::async_trait]
pub trait Command: Sync + Send {
    /// Token that invokes the command after the prefix
    fn name(&self) -> &'static str;
    /// One line for the help listing, shown after the prefixed name.  `None` hides the command.
    fn usage(&self) -> Option<&'static str>;
    /// Privileged commands still run in ignored channels
    fn privileged(&self) -> bool {
        false
    }
    async fn run(&self, ctx: &Context, msg: &Message, args: &str) -> Result<()>;
}

/// Every available command
pub fn commands() -> Vec<Box<dyn Command>> {
    vec![
        Box::new(join::Join),
        Box::new(leave::Leave),
        Box::new(np::NowPlaying),
        Box::new(stats::Stats),
        Box::new(prefix::SetPrefix),
        Box::new(ignore::Ignore),
        Box::new(ignore::Unignore),
        Box::new(eval::Eval),
        Box::new(help::Help),
    ]
}

pub fn router(default_prefix: &str) -> Router {
    let mut router = Router::new(default_prefix);
    for command in commands() {
        router.register(command.name(), command);
    }
    router
}

/// Tells the author off unless they're a bot owner.  Returns whether they are.
async fn require_owner(ctx: &Context<'_>, msg: &Message) -> Result<bool> {
    if msg.is_from_owner(ctx) {
        return Ok(true);
    }
    msg.channel_id.say(ctx.cache_http, NOT_OWNER).await?;
    Ok(false)
}

/// Same as [`require_owner`] for owners and server managers.
async fn require_manager(ctx: &Context<'_>, msg: &Message) -> Result<bool> {
    if msg.is_privileged(ctx) {
        return Ok(true);
    }
    msg.channel_id.say(ctx.cache_http, NOT_MANAGER).await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_is_routable() {
        let router = router("~~");
        for command in commands() {
            let content = format!("~~{} some args", command.name());
            let (routed, args) = router.route(&content, None).unwrap();
            assert_eq!(routed.name(), command.name());
            assert_eq!(args, "some args");
        }
    }

    #[test]
    fn only_owner_commands_are_privileged() {
        let mut privileged: Vec<_> = commands()
            .into_iter()
            .filter(|command| command.privileged())
            .map(|command| command.name())
            .collect();
        privileged.sort();
        assert_eq!(privileged, ["eval", "stats"]);
    }
}
