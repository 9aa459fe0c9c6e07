use super::Command;
use crate::context::Context;
use anyhow::Result;
use serenity::all::Message;

pub struct NowPlaying;

#[serenity::async_trait]
impl Command for NowPlaying {
    fn name(&self) -> &'static str {
        "np"
    }

    fn usage(&self) -> Option<&'static str> {
        Some("np - show the song currently playing")
    }

    async fn run(&self, ctx: &Context, msg: &Message, _args: &str) -> Result<()> {
        let reply = match ctx.radio.now_playing() {
            Some(now_playing) => now_playing.summary(),
            None => "Nothing playing right now, the radio info hasn't come in yet.".to_owned(),
        };
        msg.channel_id.say(ctx.cache_http, reply).await?;
        Ok(())
    }
}
