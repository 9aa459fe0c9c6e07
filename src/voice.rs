//! Voice connections, each playing the radio stream.

use crate::{
    lifecycle::pause,
    log_error, log_internal,
    settings::{SettingsStore, VoiceChannel},
};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::TrackHandle,
    Call, Event, EventContext, Songbird, TrackEvent,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Wait before restarting playback after the stream ends or errors
const RESTART_DELAY: Duration = Duration::from_secs(5);
/// Wait between attempts to rejoin a channel that failed to connect
const JOIN_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Voice {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    stream_url: Arc<str>,
    // The stream track currently playing in each guild
    tracks: Arc<Mutex<HashMap<GuildId, TrackHandle>>>,
}

impl Voice {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, stream_url: &str) -> Self {
        Self {
            manager,
            http,
            stream_url: Arc::from(stream_url),
            tracks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The channel the bot is connected to in `guild_id`, if any
    pub async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel_id = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel_id.0.get()))
    }

    /// Connects to `channel_id`, or moves there if already connected elsewhere in the guild.
    /// Playback starts with the first connection and carries over moves.
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        let connected = self.current_channel(guild_id).await;
        if connected == Some(channel_id) {
            return Ok(());
        }

        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            anyhow!(
                "Could not join voice channel {} in guild {}: {}",
                channel_id,
                guild_id,
                e
            )
        })?;

        let mut call = call.lock().await;
        if let Err(e) = call.deafen(true).await {
            log_error!("Could not deafen in guild {}: {}", guild_id, e);
        }
        self.ensure_playing(&mut call, guild_id);

        match connected {
            None => log_internal!(
                "Added voice connection ({}) for guild {}",
                channel_id,
                guild_id
            ),
            Some(_) => log_internal!(
                "Moved voice connection for guild {} to {}",
                guild_id,
                channel_id
            ),
        }

        Ok(())
    }

    /// Joins now if possible; otherwise keeps retrying in the background for as long as the guild
    /// stays bound to `channel_id`.
    pub async fn join_or_retry(
        &self,
        settings: &Arc<SettingsStore>,
        guild_id: GuildId,
        channel_id: ChannelId,
        shutdown: &CancellationToken,
    ) {
        let Err(e) = self.join(guild_id, channel_id).await else {
            return;
        };
        log_error!("{}", e);

        let voice = self.clone();
        let settings = Arc::clone(settings);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                if !pause(&shutdown, JOIN_RETRY_DELAY).await {
                    return;
                }

                if settings.lookup(guild_id, VoiceChannel) != Some(channel_id) {
                    return;
                }

                match voice.join(guild_id, channel_id).await {
                    Ok(()) => return,
                    Err(e) => log_error!("{}", e),
                }
            }
        });
    }

    /// Disconnects from the guild's voice channel.  Returns false if there was no connection.
    pub async fn leave(&self, guild_id: GuildId) -> Result<bool> {
        let connected = self.current_channel(guild_id).await.is_some();

        // Forget the track first so its end event doesn't restart it
        self.tracks.lock().remove(&guild_id);

        if self.manager.get(guild_id).is_some() {
            self.manager
                .remove(guild_id)
                .await
                .map_err(|e| anyhow!("Could not leave voice in guild {}: {}", guild_id, e))?;
            log_internal!("Removed voice connection for guild {}", guild_id);
        }

        Ok(connected)
    }

    fn ensure_playing(&self, call: &mut Call, guild_id: GuildId) {
        let mut tracks = self.tracks.lock();
        if tracks.contains_key(&guild_id) {
            return;
        }

        let input = HttpRequest::new(self.http.clone(), self.stream_url.to_string());
        let track = call.play_input(input.into());

        for event in [TrackEvent::End, TrackEvent::Error] {
            let restart = RestartStream {
                voice: self.clone(),
                guild_id,
                track: track.clone(),
            };
            if let Err(e) = track.add_event(Event::Track(event), restart) {
                log_error!("Could not watch stream track in guild {}: {}", guild_id, e);
            }
        }

        tracks.insert(guild_id, track);
    }
}

/// Starts the stream again when its track stops while the bot is still connected.
struct RestartStream {
    voice: Voice,
    guild_id: GuildId,
    track: TrackHandle,
}

#[serenity::async_trait]
impl songbird::EventHandler for RestartStream {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let guild_id = self.guild_id;

        {
            let mut tracks = self.voice.tracks.lock();
            match tracks.get(&guild_id) {
                Some(current) if current.uuid() == self.track.uuid() => {
                    tracks.remove(&guild_id);
                }
                // Replaced or left on purpose
                _ => return None,
            }
        }

        log_error!("Stream stopped in guild {}, restarting", guild_id);

        let voice = self.voice.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_DELAY).await;

            let Some(call) = voice.manager.get(guild_id) else {
                return;
            };
            let mut call = call.lock().await;
            if call.current_channel().is_some() {
                voice.ensure_playing(&mut call, guild_id);
            }
        });

        None
    }
}
