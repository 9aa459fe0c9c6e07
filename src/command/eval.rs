use super::{require_owner, Command};
use crate::{context::Context, helper::MessageHelper, log_internal};
use anyhow::{anyhow, Result};
use serenity::all::Message;

/// Runs a shell script on the host.  Needs `unsafe_eval` in the config on top of being an owner.
pub struct Eval;

#[serenity::async_trait]
impl Command for Eval {
    fn name(&self) -> &'static str {
        "eval"
    }

    fn usage(&self) -> Option<&'static str> {
        None
    }

    fn privileged(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
        if !require_owner(ctx, msg).await? {
            return Ok(());
        }
        if !ctx.cfg.general.unsafe_eval {
            msg.channel_id
                .say(ctx.cache_http, "eval is disabled in the config.")
                .await?;
            return Ok(());
        }
        if args.trim().is_empty() {
            return Ok(());
        }

        log_internal!("{} evaluating: {}", msg.author.name, args);
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(args)
            .output()
            .await
            .map_err(|e| anyhow!("Could not run `sh`: {}", e))?;

        let rendered = render_output(&output.stdout, &output.stderr, output.status.code());
        msg.reply_chunked(ctx, &rendered).await
    }
}

fn render_output(stdout: &[u8], stderr: &[u8], code: Option<i32>) -> String {
    let mut rendered = String::from_utf8_lossy(stdout).into_owned();
    rendered.push_str(&String::from_utf8_lossy(stderr));

    match code {
        Some(0) => {}
        Some(code) => rendered.push_str(&format!("\n(exit status {})", code)),
        None => rendered.push_str("\n(killed by signal)"),
    }

    if rendered.trim().is_empty() {
        "(no output)".to_owned()
    } else {
        rendered
    }
}
