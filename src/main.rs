mod command;
mod config;
mod context;
mod event;
mod handler;
mod helper;
mod lifecycle;
mod logging;
mod plugin;
mod radio;
mod router;
mod settings;
mod voice;

use serenity::{all::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();
    let shards = cfg.general.shards;

    let pool = crate::settings::connect(&cfg.storage.database_path()?).await?;
    let settings = std::sync::Arc::new(crate::settings::SettingsStore::new(
        pool,
        Duration::from_millis(cfg.storage.rejoin_delay_ms),
    ));
    // Commands may write as soon as the first shard connects
    settings.load().await?;

    let songbird = Songbird::serenity();
    let http = reqwest::Client::new();
    let voice = crate::voice::Voice::new(songbird.clone(), http.clone(), &cfg.stream.url);
    let shutdown = CancellationToken::new();
    let lifecycle = crate::lifecycle::Lifecycle::new(shutdown.clone(), http);
    let handler = handler::Handler::new(cfg, settings.clone(), voice, lifecycle);

    // Things we want discord to tell us about.
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;
    let shard_manager = client.shard_manager.clone();

    let result: anyhow::Result<()> = tokio::select! {
        result = async {
            match shards {
                Some(shards) => client.start_shards(shards).await,
                None => client.start_autosharded().await,
            }
        } => result.map_err(Into::into),
        signal = tokio::signal::ctrl_c() => {
            log_internal!("Shutting down");
            signal.map_err(Into::into)
        }
    };

    shutdown.cancel();
    shard_manager.shutdown_all().await;
    settings.shutdown().await;

    result
}
