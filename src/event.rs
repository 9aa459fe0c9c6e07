//! Serenity delivers events through one callback per event kind.  The handler turns each callback
//! into an `Event` and offers it to the plugins in order.

use crate::{context::Context, log_error};
use serenity::all::{Guild, GuildId, Message, Ready, UnavailableGuild, VoiceState};

/// A Discord event
pub enum Event {
    Ready(Ready),
    /// No guild is waiting to be cached, across all shards connected so far.  Fires again after
    /// each later guild arrives.
    CacheReady(Vec<GuildId>),
    Message(Message),
    GuildCreate {
        guild: Guild,
        is_new: Option<bool>,
    },
    GuildDelete {
        incomplete: UnavailableGuild,
        full: Option<Guild>,
    },
    VoiceStateUpdate {
        old: Option<VoiceState>,
        new: VoiceState,
    },
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => log_error!("Error in plugin {}: {}", plugin.name(), err),
            }
        }
    }
}

pub enum EventHandled {
    Yes,
    No,
}
