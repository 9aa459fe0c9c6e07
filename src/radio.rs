//! Live state of the radio: what's playing, and how many people are listening through the bot.

use crate::{lifecycle::pause, log_error, log_internal};
use anyhow::{anyhow, Result};
use futures::StreamExt;
use parking_lot::RwLock;
use serenity::all::{Cache, ChannelId, UserId};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// Pause before reconnecting to the status socket.  There's no retry limit; the radio is expected
/// to come back eventually.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const LISTENER_TALLY_INTERVAL: Duration = Duration::from_secs(20);
const LISTENER_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// One update from the status socket
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct NowPlaying {
    #[serde(default)]
    pub song_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub anime_name: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub listeners: Option<u64>,
}

// The status feed has sent listener counts both as numbers and as strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    Ok(
        match <Option<Count> as serde::Deserialize>::deserialize(deserializer)? {
            Some(Count::Number(n)) => Some(n),
            Some(Count::Text(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl NowPlaying {
    pub fn anime(&self) -> Option<&str> {
        non_empty(&self.anime_name)
    }

    pub fn requester(&self) -> Option<&str> {
        non_empty(&self.requested_by)
    }

    /// Chat-formatted answer to `np`
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "**Now playing:** \"{}\" by {}",
            self.song_name, self.artist_name
        );
        if let Some(anime) = self.anime() {
            summary.push_str(&format!("\n**Anime:** {}", anime));
        }
        if let Some(requester) = self.requester() {
            summary.push_str(&format!("\n**Requested by:** {}", requester));
        }
        summary
    }

    /// Text shown as the bot's activity
    pub fn activity(&self, separator: &str) -> String {
        format!("{} {} {}", self.artist_name, separator, self.song_name)
    }
}

/// Listeners and connections summed over every voice channel the bot is in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Audience {
    pub listeners: usize,
    pub voice_channels: usize,
}

impl Audience {
    /// Counts the users sharing a voice channel with the bot in one guild.  `states` yields each
    /// member's channel and whether they are deafened.  `None` if the bot isn't connected there.
    pub fn in_guild<I>(bot_id: UserId, states: I) -> Option<usize>
    where
        I: IntoIterator<Item = (UserId, Option<ChannelId>, bool)>,
    {
        let states: Vec<_> = states.into_iter().collect();
        let bot_channel = states
            .iter()
            .find(|(user_id, _, _)| *user_id == bot_id)
            .and_then(|(_, channel_id, _)| *channel_id)?;

        Some(
            states
                .iter()
                .filter(|(user_id, channel_id, deafened)| {
                    *user_id != bot_id && *channel_id == Some(bot_channel) && !deafened
                })
                .count(),
        )
    }

    pub fn tally(cache: &Cache) -> Self {
        let bot_id = cache.current_user().id;
        let mut audience = Self::default();

        for guild_id in cache.guilds() {
            let Some(guild) = cache.guild(guild_id) else {
                continue;
            };
            let states = guild
                .voice_states
                .values()
                .map(|state| (state.user_id, state.channel_id, state.deaf || state.self_deaf));
            if let Some(listeners) = Self::in_guild(bot_id, states) {
                audience.listeners += listeners;
                audience.voice_channels += 1;
            }
        }

        audience
    }
}

/// Radio state shared between the status socket, timers and commands
#[derive(Default)]
pub struct Radio {
    now_playing: RwLock<Option<NowPlaying>>,
    listeners: AtomicUsize,
}

impl Radio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.read().clone()
    }

    /// Last tallied Discord listener count
    pub fn listeners(&self) -> usize {
        self.listeners.load(Ordering::Relaxed)
    }

    pub fn set_listeners(&self, listeners: usize) {
        self.listeners.store(listeners, Ordering::Relaxed);
    }

    /// Applies one text frame from the status socket.  Empty frames are keep-alives.
    pub fn update(&self, frame: &str) -> Result<()> {
        if frame.trim().is_empty() {
            return Ok(());
        }

        let now_playing: NowPlaying = serde_json::from_str(frame)
            .map_err(|e| anyhow!("Could not parse status update: {}", e))?;
        *self.now_playing.write() = Some(now_playing);
        Ok(())
    }

    /// Keeps a connection to the status socket open until `shutdown` fires.
    pub async fn follow_status(&self, url: &str, shutdown: &CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                result = self.listen(url) => match result {
                    Ok(()) => log_internal!("Status socket closed, reconnecting..."),
                    Err(e) => log_error!("Status socket failed, reconnecting: {}", e),
                },
            }

            if !pause(shutdown, RECONNECT_DELAY).await {
                return;
            }
        }
    }

    async fn listen(&self, url: &str) -> Result<()> {
        let (mut socket, _) = connect_async(url)
            .await
            .map_err(|e| anyhow!("Could not connect to `{}`: {}", url, e))?;
        log_internal!("Status socket connected");

        while let Some(message) = socket.next().await {
            match message? {
                Message::Text(text) => {
                    if let Err(e) = self.update(&text) {
                        log_error!("{}", e);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        Ok(())
    }

    /// Recounts listeners from the cache every few seconds until `shutdown` fires.
    pub async fn tally_listeners(&self, cache: &Cache, shutdown: &CancellationToken) {
        loop {
            self.set_listeners(Audience::tally(cache).listeners);

            if !pause(shutdown, LISTENER_TALLY_INTERVAL).await {
                return;
            }
        }
    }

    /// Periodically posts the listener count to an external endpoint.
    pub async fn report_listeners(
        &self,
        http: &reqwest::Client,
        url: &str,
        shutdown: &CancellationToken,
    ) {
        loop {
            if !pause(shutdown, LISTENER_REPORT_INTERVAL).await {
                return;
            }

            let body = serde_json::json!({ "number": self.listeners() });
            let result = http
                .post(url)
                .json(&body)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            if let Err(e) = result {
                log_error!("Could not report listener count: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{
        "song_name": "Renai Circulation",
        "artist_name": "Kana Hanazawa",
        "anime_name": "Bakemonogatari",
        "requested_by": "",
        "listeners": "512"
    }"#;

    #[test]
    fn parses_status_frame() {
        let radio = Radio::new();
        assert_eq!(radio.now_playing(), None);

        radio.update(FRAME).unwrap();
        let now_playing = radio.now_playing().unwrap();
        assert_eq!(now_playing.song_name, "Renai Circulation");
        assert_eq!(now_playing.listeners, Some(512));
        assert_eq!(now_playing.anime(), Some("Bakemonogatari"));
        assert_eq!(now_playing.requester(), None);
    }

    #[test]
    fn bad_frames_keep_previous_state() {
        let radio = Radio::new();
        radio.update(FRAME).unwrap();

        assert!(radio.update("{ definitely not json").is_err());
        radio.update("   ").unwrap();
        assert_eq!(radio.now_playing().unwrap().artist_name, "Kana Hanazawa");
    }

    #[test]
    fn summary_includes_optional_fields() {
        let now_playing = NowPlaying {
            song_name: "Sugar Song to Bitter Step".to_owned(),
            artist_name: "UNISON SQUARE GARDEN".to_owned(),
            anime_name: None,
            requested_by: Some("Geo".to_owned()),
            listeners: Some(3),
        };

        assert_eq!(
            now_playing.summary(),
            "**Now playing:** \"Sugar Song to Bitter Step\" by UNISON SQUARE GARDEN\n\
             **Requested by:** Geo"
        );
        assert_eq!(
            now_playing.activity("-"),
            "UNISON SQUARE GARDEN - Sugar Song to Bitter Step"
        );
    }

    #[test]
    fn numeric_listener_count() {
        let now_playing: NowPlaying =
            serde_json::from_str(r#"{"song_name":"a","artist_name":"b","listeners":7}"#).unwrap();
        assert_eq!(now_playing.listeners, Some(7));
    }

    #[test]
    fn counts_undeafened_users_in_bot_channel() {
        let bot = UserId::new(1);
        let radio_channel = ChannelId::new(10);
        let other_channel = ChannelId::new(11);

        let states = vec![
            (bot, Some(radio_channel), true),
            (UserId::new(2), Some(radio_channel), false),
            (UserId::new(3), Some(radio_channel), false),
            (UserId::new(4), Some(radio_channel), true),
            (UserId::new(5), Some(other_channel), false),
            (UserId::new(6), None, false),
        ];
        assert_eq!(Audience::in_guild(bot, states), Some(2));
    }

    #[test]
    fn no_count_when_bot_not_connected() {
        let bot = UserId::new(1);
        let states = vec![(UserId::new(2), Some(ChannelId::new(10)), false)];
        assert_eq!(Audience::in_guild(bot, states), None);
        assert_eq!(Audience::in_guild(bot, vec![(bot, None, false)]), None);
    }
}
