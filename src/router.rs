//! Prefix-based command routing.
//!
//! A message is a command when it starts with the active prefix.  The first whitespace-delimited
//! token after the prefix names the command; everything after the first whitespace character is
//! handed to the command as its argument string.

use crate::command::Command;
use std::{collections::HashMap, future::Future};

pub struct Router<H = Box<dyn Command>> {
    default_prefix: String,
    commands: HashMap<String, H>,
}

impl<H> Router<H> {
    pub fn new(default_prefix: impl Into<String>) -> Self {
        Self {
            default_prefix: default_prefix.into(),
            commands: HashMap::new(),
        }
    }

    pub fn default_prefix(&self) -> &str {
        &self.default_prefix
    }

    /// Associates `command` with `handler`, returning the handler it replaced.
    pub fn register(&mut self, command: &str, handler: H) -> Option<H> {
        self.commands.insert(command.to_lowercase(), handler)
    }

    /// Finds the handler `content` addresses along with its argument string.  `prefix` falls back
    /// to the default prefix.
    pub fn route<'r, 'm>(
        &'r self,
        content: &'m str,
        prefix: Option<&str>,
    ) -> Option<(&'r H, &'m str)> {
        let prefix = prefix.unwrap_or(self.default_prefix.as_str());
        let rest = content.strip_prefix(prefix)?;

        let (command, args) = match rest.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args),
            None => (rest, ""),
        };

        self.commands.get(command).map(|handler| (handler, args))
    }

    /// Routes `content` and, when it names a command, hands the handler and its argument string
    /// to `invoke`.
    pub async fn process<'r, 'm, F, Fut>(
        &'r self,
        content: &'m str,
        prefix: Option<&str>,
        invoke: F,
    ) -> Option<Fut::Output>
    where
        F: FnOnce(&'r H, &'m str) -> Fut,
        Fut: Future,
    {
        let (handler, args) = self.route(content, prefix)?;
        Some(invoke(handler, args).await)
    }

    /// Registered commands, sorted by name
    pub fn commands(&self) -> Vec<(&str, &H)> {
        let mut commands: Vec<_> = self
            .commands
            .iter()
            .map(|(name, handler)| (name.as_str(), handler))
            .collect();
        commands.sort_by_key(|(name, _)| *name);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router<&'static str> {
        let mut router = Router::new("~~");
        router.register("np", "np");
        router.register("join", "join");
        router.register("prefix", "prefix");
        router
    }

    #[test]
    fn routes_command_with_arguments() {
        let router = router();
        assert_eq!(
            router.route("~~np extra arg", None),
            Some((&"np", "extra arg"))
        );
    }

    #[test]
    fn command_without_arguments_gets_empty_string() {
        assert_eq!(router().route("~~join", None), Some((&"join", "")));
    }

    #[test]
    fn ignores_text_without_prefix() {
        let router = router();
        assert_eq!(router.route("np extra arg", None), None);
        assert_eq!(router.route("hello ~~np", None), None);
    }

    #[test]
    fn bare_prefix_routes_nowhere() {
        let router = router();
        assert_eq!(router.route("~~", None), None);
        assert_eq!(router.route("~~   ", None), None);
        assert_eq!(router.route("~~ np", None), None);
    }

    #[test]
    fn unknown_and_inexact_commands_route_nowhere() {
        let router = router();
        assert_eq!(router.route("~~nope", None), None);
        assert_eq!(router.route("~~NP", None), None);
        assert_eq!(router.route("~~npx", None), None);
    }

    #[test]
    fn explicit_prefix_replaces_default() {
        let router = router();
        assert_eq!(router.route("!prefix ?", Some("!")), Some((&"prefix", "?")));
        assert_eq!(router.route("~~prefix ?", Some("!")), None);
    }

    #[test]
    fn argument_keeps_inner_whitespace() {
        assert_eq!(
            router().route("~~prefix  a  b", None),
            Some((&"prefix", " a  b"))
        );
    }

    #[test]
    fn reregistering_replaces_handler() {
        let mut router = router();
        assert_eq!(router.register("NP", "playing"), Some("np"));
        assert_eq!(router.route("~~np", None), Some((&"playing", "")));
        assert_eq!(router.commands().len(), 3);
    }

    #[tokio::test]
    async fn process_invokes_handler() {
        let router = router();

        let result = router
            .process("~~np extra arg", None, |handler, args| async move {
                format!("{handler}({args})")
            })
            .await;
        assert_eq!(result.as_deref(), Some("np(extra arg)"));

        let result = router
            .process("just chatting", None, |handler, _| async move { *handler })
            .await;
        assert_eq!(result, None);
    }
}
