use super::{require_owner, Command};
use crate::{context::Context, radio::Audience};
use anyhow::Result;
use serenity::all::{CreateEmbed, CreateMessage, Message, Timestamp};

const TITLE: &str = "LISTEN.moe (Click here to add the radio bot to your server)";
const THUMBNAIL: &str = "http://i.imgur.com/Jfz6qak.png";
const COLOUR: u32 = 15473237;

pub struct Stats;

#[serenity::async_trait]
impl Command for Stats {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("stats - radio and bot statistics (bot owners)")
    }

    fn privileged(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &Context, msg: &Message, _args: &str) -> Result<()> {
        if !require_owner(ctx, msg).await? {
            return Ok(());
        }

        let now_playing = ctx.radio.now_playing().unwrap_or_default();
        let mut description = format!(
            "**Now playing:** {} **by** {}",
            now_playing.song_name, now_playing.artist_name
        );
        if let Some(requester) = now_playing.requester() {
            description.push_str(&format!("\n**Requested by:** {}", requester));
        }

        let invite = format!(
            "https://discord.com/oauth2/authorize?client_id={}&scope=bot",
            ctx.cache.current_user().id
        );
        let radio_listeners = now_playing
            .listeners
            .map_or_else(|| "?".to_owned(), |listeners| listeners.to_string());
        let audience = Audience::tally(ctx.cache);

        let embed = CreateEmbed::new()
            .title(TITLE)
            .url(invite)
            .description(description)
            .colour(COLOUR)
            .field("Radio Listeners", radio_listeners, true)
            .field("Discord Listeners", audience.listeners.to_string(), true)
            .field("Servers", ctx.cache.guild_count().to_string(), true)
            .field("Voice Channels", audience.voice_channels.to_string(), true)
            .timestamp(Timestamp::now())
            .thumbnail(THUMBNAIL);

        msg.channel_id
            .send_message(ctx.cache_http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}
