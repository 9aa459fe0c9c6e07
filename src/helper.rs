//! Miscellaneous convenience methods

use crate::context::Context;
use anyhow::Result;
use serenity::all::ChannelId;

/// Discord rejects messages longer than this
pub const MESSAGE_LIMIT: usize = 2000;

#[serenity::async_trait]
pub trait MessageHelper {
    fn is_from_owner(&self, ctx: &Context) -> bool;
    fn can_manage_guild(&self, ctx: &Context) -> bool;
    /// Owners and server managers, who aren't subject to a guild's ignore list
    fn is_privileged(&self, ctx: &Context) -> bool;
    fn author_voice_channel(&self, ctx: &Context) -> Option<ChannelId>;
    async fn reply_chunked(&self, ctx: &Context, text: &str) -> Result<()>;
}

#[serenity::async_trait]
impl MessageHelper for serenity::all::Message {
    fn is_from_owner(&self, ctx: &Context) -> bool {
        ctx.cfg.is_owner(self.author.id)
    }

    fn can_manage_guild(&self, ctx: &Context) -> bool {
        self.author_permissions(ctx.cache)
            .is_some_and(|permissions| permissions.manage_guild())
    }

    fn is_privileged(&self, ctx: &Context) -> bool {
        self.is_from_owner(ctx) || self.can_manage_guild(ctx)
    }

    fn author_voice_channel(&self, ctx: &Context) -> Option<ChannelId> {
        let guild = self.guild(ctx.cache)?;
        guild
            .voice_states
            .get(&self.author.id)
            .and_then(|state| state.channel_id)
    }

    async fn reply_chunked(&self, ctx: &Context, text: &str) -> Result<()> {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            self.channel_id.say(ctx.cache_http, chunk).await?;
        }
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` bytes, preferring line breaks and never cutting a
/// character in half.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        if let Some(newline) = rest[..cut].rfind('\n') {
            if newline > 0 {
                cut = newline + 1;
            }
        }

        let (chunk, tail) = rest.split_at(cut);
        chunks.push(chunk.to_owned());
        rest = tail;
    }

    if !rest.is_empty() {
        chunks.push(rest.to_owned());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn prefers_line_breaks() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn hard_splits_long_lines() {
        let chunks = split_message(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.len() <= 10));
        assert_eq!(chunks.concat(), "x".repeat(25));
    }

    #[test]
    fn never_splits_a_character() {
        let text = "ééééé"; // 2 bytes each
        let chunks = split_message(text, 3);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|chunk| chunk.len() <= 3));
    }
}
