use crate::{
    config::Config, context::Context, event::Event, lifecycle::Lifecycle, radio::Radio,
    router::Router, settings::SettingsStore, voice::Voice,
};
use serenity::all::{Guild, GuildId, Message, Ready, UnavailableGuild, VoiceState};
use std::sync::Arc;

/// Discord event handler
pub struct Handler {
    cfg: Config,
    settings: Arc<SettingsStore>,
    radio: Arc<Radio>,
    voice: Voice,
    router: Router,
    lifecycle: Lifecycle,
}

impl<'a> Handler {
    pub fn new(
        cfg: Config,
        settings: Arc<SettingsStore>,
        voice: Voice,
        lifecycle: Lifecycle,
    ) -> Self {
        let router = crate::command::router(&cfg.general.command_prefix);
        Self {
            cfg,
            settings,
            radio: Arc::new(Radio::new()),
            voice,
            router,
            lifecycle,
        }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            settings: &self.settings,
            radio: &self.radio,
            voice: &self.voice,
            router: &self.router,
            lifecycle: &self.lifecycle,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn cache_ready(&self, discord_ctx: serenity::all::Context, guilds: Vec<GuildId>) {
        Event::CacheReady(guilds)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }

    async fn guild_create(
        &self,
        discord_ctx: serenity::all::Context,
        guild: Guild,
        is_new: Option<bool>,
    ) {
        Event::GuildCreate { guild, is_new }
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn guild_delete(
        &self,
        discord_ctx: serenity::all::Context,
        incomplete: UnavailableGuild,
        full: Option<Guild>,
    ) {
        Event::GuildDelete { incomplete, full }
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn voice_state_update(
        &self,
        discord_ctx: serenity::all::Context,
        old: Option<VoiceState>,
        new: VoiceState,
    ) {
        Event::VoiceStateUpdate { old, new }
            .handle(self.ctx(&discord_ctx))
            .await;
    }
}
