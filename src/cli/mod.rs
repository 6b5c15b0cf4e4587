//! Command-line interface for voicelink.
//!
//! Provides commands for sending and replying, watching a session live,
//! dictating, running the assist operations directly, and managing the
//! local history and profile.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::adapters;
use crate::assist::AssistService;
use crate::config::{self, profile::Profile, AssistSettings, ResolvedConfig};
use crate::core::{derive_latest_inbound, SessionView};
use crate::domain::{Message, MessageKind, Role};
use crate::notification::{MuteFlag, NotificationEmitter};
use crate::store::{JsonlMessageStore, MessageStore};

pub mod live;

/// voicelink - Live transcription chat between a sender and a receiver
#[derive(Parser, Debug)]
#[command(name = "voicelink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Session name (defaults to the configured session)
    #[arg(short, long, global = true, env = "VOICELINK_SESSION")]
    pub session: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message as the sender
    Send {
        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,

        /// Polish the text with assist before sending
        #[arg(short, long)]
        refine: bool,
    },

    /// Reply as the receiver
    Reply {
        /// Free-text reply
        #[arg(conflicts_with_all = ["preset", "emoji"])]
        text: Option<String>,

        /// Send preset reply N (1-based)
        #[arg(short, long, conflicts_with = "emoji", value_parser = parse_index)]
        preset: Option<usize>,

        /// Send emoji N (1-based)
        #[arg(short, long, value_parser = parse_index)]
        emoji: Option<usize>,
    },

    /// Follow the session live
    Watch {
        /// Which side to watch as
        #[arg(short, long, value_enum, default_value = "receiver")]
        role: RoleArg,

        /// Start with notifications muted
        #[arg(short, long)]
        mute: bool,
    },

    /// Dictate messages from stdin lines
    Dictate {
        /// Polish each utterance before sending
        #[arg(short, long)]
        refine: bool,

        /// Print utterances without sending them
        #[arg(long)]
        no_send: bool,
    },

    /// Polish a draft and print it
    Refine {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Suggest replies (to TEXT, or to the latest inbound message)
    Suggest {
        text: Option<String>,
    },

    /// Print the session history
    History {
        /// Ordering to print with
        #[arg(short, long, value_enum, default_value = "sender")]
        role: RoleArg,
    },

    /// Delete the whole session history
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or update the local profile
    Profile {
        /// Set the display name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Role for CLI (maps to Role)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Sender,
    Receiver,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Sender => Role::Sender,
            RoleArg::Receiver => Role::Receiver,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;
        let session = self.session.unwrap_or_else(|| cfg.session.clone());

        match self.command {
            Commands::Send { text, refine } => send(cfg, &session, &text.join(" "), refine).await,
            Commands::Reply {
                text,
                preset,
                emoji,
            } => reply(cfg, &session, text, preset, emoji).await,
            Commands::Watch { role, mute } => {
                let view = open_view(cfg, &session, role.into(), mute).await?;
                live::watch(view).await
            }
            Commands::Dictate { refine, no_send } => {
                let view = open_view(cfg, &session, Role::Sender, true).await?;
                live::dictate(view, &cfg.capture.language, refine, !no_send).await
            }
            Commands::Refine { text } => refine(cfg, &text.join(" ")).await,
            Commands::Suggest { text } => suggest(cfg, &session, text).await,
            Commands::History { role } => history(cfg, &session, role.into()).await,
            Commands::Clear { yes } => clear(cfg, &session, yes).await,
            Commands::Profile { name } => profile(cfg, name).await,
            Commands::Config => show_config(cfg).await,
        }
    }
}

/// Build the assist service, or None (logged) when no backend is usable
fn assist_service(cfg: &ResolvedConfig) -> Option<AssistService> {
    match adapters::from_settings(&cfg.assist) {
        Ok(adapter) => Some(AssistService::new(adapter, cfg.assist.timeout())),
        Err(e) => {
            warn!(error = %e, "Assist unavailable");
            None
        }
    }
}

fn require_assist(cfg: &ResolvedConfig) -> Result<AssistService> {
    let adapter = adapters::from_settings(&cfg.assist).context("Assist backend unavailable")?;
    Ok(AssistService::new(adapter, cfg.assist.timeout()))
}

fn open_store(cfg: &ResolvedConfig) -> Arc<JsonlMessageStore> {
    Arc::new(JsonlMessageStore::new(cfg.sessions_dir()))
}

/// Open a role view on the file-backed store with the local profile
async fn open_view(cfg: &ResolvedConfig, session: &str, role: Role, mute: bool) -> Result<SessionView> {
    let profile = Profile::load_or_create(&cfg.profile_path()).await?;
    let emitter = NotificationEmitter::terminal(&cfg.notifications);
    let mute = MuteFlag::new(mute || cfg.notifications.muted);

    let mut view = SessionView::new(open_store(cfg), session, role, profile, emitter, mute)
        .with_reply_settings(cfg.replies.clone());
    if let Some(assist) = assist_service(cfg) {
        view = view.with_assist(assist);
    }
    Ok(view)
}

/// One history line
/// Turn a 1-based item number into a list index
pub(crate) fn parse_index(arg: &str) -> Result<usize> {
    let n: usize = arg.parse().context("Expected a number")?;
    n.checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("Numbers start at 1"))
}

pub(crate) fn format_message(message: &Message, own_identity: &str) -> String {
    let time = Local
        .timestamp_millis_opt(message.local_time as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let marker = if message.is_from(own_identity) { "*" } else { " " };
    let text = match message.kind {
        MessageKind::Text => message.text.clone(),
        MessageKind::Emoji => format!("[{}]", message.text),
        MessageKind::Preset => format!("« {} »", message.text),
    };

    format!(
        "{} {}{} ({}): {}",
        time, marker, message.author.display_name, message.role, text
    )
}

async fn send(cfg: &ResolvedConfig, session: &str, text: &str, refine: bool) -> Result<()> {
    let view = open_view(cfg, session, Role::Sender, true).await?;

    let text = if refine {
        let polished = view.refine_draft(text).await;
        eprintln!("Refined: {}", polished);
        polished
    } else {
        text.to_string()
    };

    let id = view.send_text(&text).await?;
    eprintln!("Sent {}", id);
    Ok(())
}

async fn reply(
    cfg: &ResolvedConfig,
    session: &str,
    text: Option<String>,
    preset: Option<usize>,
    emoji: Option<usize>,
) -> Result<()> {
    let view = open_view(cfg, session, Role::Receiver, true).await?;

    let id = match (text, preset, emoji) {
        (Some(text), _, _) => view.send_text(&text).await?,
        (None, Some(n), _) => view.reply_preset(n).await?,
        (None, None, Some(n)) => view.reply_emoji(n).await?,
        (None, None, None) => {
            eprintln!("Presets:");
            for (i, preset) in view.presets().iter().enumerate() {
                eprintln!("  {}. {}", i + 1, preset);
            }
            eprintln!("Emoji:");
            for (i, emoji) in view.emojis().iter().enumerate() {
                eprintln!("  {}. {}", i + 1, emoji);
            }
            anyhow::bail!("Give reply text, --preset N or --emoji N");
        }
    };

    eprintln!("Sent {}", id);
    Ok(())
}

async fn refine(cfg: &ResolvedConfig, text: &str) -> Result<()> {
    let assist = require_assist(cfg)?;
    println!("{}", assist.refine(text).await);
    Ok(())
}

async fn suggest(cfg: &ResolvedConfig, session: &str, text: Option<String>) -> Result<()> {
    let assist = require_assist(cfg)?;

    let inbound = match text {
        Some(text) => text,
        None => {
            let messages = open_store(cfg).read_all(session).await?;
            match derive_latest_inbound(&messages) {
                Some(latest) => {
                    eprintln!("Replying to: {}", latest.text);
                    latest.text.clone()
                }
                None => anyhow::bail!("No inbound message in session '{}'", session),
            }
        }
    };

    let replies = assist.suggest_replies(&inbound).await;
    if replies.is_empty() {
        eprintln!("No suggestions available");
    }
    for (i, reply) in replies.iter().enumerate() {
        println!("{}. {}", i + 1, reply);
    }
    Ok(())
}

async fn history(cfg: &ResolvedConfig, session: &str, role: Role) -> Result<()> {
    let profile = Profile::load_or_create(&cfg.profile_path()).await?;
    let mut messages = open_store(cfg).read_all(session).await?;

    if messages.is_empty() {
        println!("No messages in '{}'", session);
        return Ok(());
    }

    role.project(&mut messages);
    for message in &messages {
        println!("{}", format_message(message, &profile.identity));
    }
    Ok(())
}

async fn clear(cfg: &ResolvedConfig, session: &str, yes: bool) -> Result<()> {
    if !yes {
        eprint!("Delete all messages in '{}'? [y/N] ", session);
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            eprintln!("Cancelled");
            return Ok(());
        }
    }

    let view = open_view(cfg, session, Role::Sender, true).await?;
    let removed = view.clear_history().await?;
    eprintln!("Removed {} messages from '{}'", removed, session);
    Ok(())
}

async fn profile(cfg: &ResolvedConfig, name: Option<String>) -> Result<()> {
    let path = cfg.profile_path();
    let mut profile = Profile::load_or_create(&path).await?;

    if let Some(name) = name {
        profile.display_name = Some(name).filter(|n| !n.trim().is_empty());
        profile.save(&path).await?;
    }

    println!("Identity:     {}", profile.identity);
    println!(
        "Display name: {}",
        profile.display_name.as_deref().unwrap_or("(role default)")
    );
    Ok(())
}

/// Show the resolved configuration (for debugging)
/// One-line reachability report for the configured completion backend
async fn assist_status(settings: &AssistSettings) -> String {
    let adapter = match adapters::from_settings(settings) {
        Ok(adapter) => adapter,
        Err(e) => return format!("unavailable ({:#})", e),
    };
    match adapter.health_check().await {
        Ok(()) => format!("{} reachable", adapter.name()),
        Err(e) => format!("{} unreachable ({:#})", adapter.name(), e),
    }
}

async fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("voicelink configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Sessions: {}", cfg.sessions_dir().display());
    println!("  Profile:  {}", cfg.profile_path().display());
    println!("  Session:  {}", cfg.session);
    println!();
    println!("Assist:");
    println!("  Backend:  {:?}", cfg.assist.backend);
    println!("  Model:    {}", cfg.assist.model);
    println!("  Command:  {}", cfg.assist.command.join(" "));
    println!("  Timeout:  {}s", cfg.assist.timeout_seconds);
    println!("  Status:   {}", assist_status(&cfg.assist).await);
    println!();
    println!("Notifications:");
    println!("  Muted:    {}", cfg.notifications.muted);
    println!(
        "  Tone:     {}Hz for {}ms",
        cfg.notifications.tone_hz, cfg.notifications.tone_ms
    );
    println!();
    println!("Capture language: {}", cfg.capture.language);
    println!("Presets: {}", cfg.replies.presets.join(" | "));
    println!("Emoji:   {}", cfg.replies.emojis.join(" "));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_is_one_based() {
        assert_eq!(parse_index("1").unwrap(), 0);
        assert_eq!(parse_index("5").unwrap(), 4);
        assert!(parse_index("0").is_err());
        assert!(parse_index("x").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_assist_status_runs_health_check() {
        let settings = |command: &str| AssistSettings {
            backend: config::AssistBackendKind::Command,
            command: vec![command.to_string()],
            ..Default::default()
        };

        assert_eq!(assist_status(&settings("true")).await, "command reachable");

        let missing = assist_status(&settings("voicelink-no-such-program")).await;
        assert!(missing.starts_with("command unreachable"), "{}", missing);
    }

    #[test]
    fn test_reply_rejects_zero_preset() {
        assert!(Cli::try_parse_from(["voicelink", "reply", "--preset", "0"]).is_err());

        let cli = Cli::try_parse_from(["voicelink", "reply", "--emoji", "2"]).unwrap();
        match cli.command {
            Commands::Reply { emoji, .. } => assert_eq!(emoji, Some(1)),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
