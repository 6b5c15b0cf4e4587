//! Long-running CLI commands: `watch` and `dictate`.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::core::{SendError, SessionView, ViewEvent};
use crate::domain::{Message, Role};
use crate::speech::{LineCaptureBackend, SpeechCaptureEngine};

use super::{format_message, parse_index};

/// Subscribe and render the session until Ctrl-C or a terminal store error.
///
/// Lines typed on stdin are sent as messages; lines starting with `/` are
/// commands (`/mute`, `/suggest`, `/s N`, `/p N`, `/e N`, `/clear`).
pub async fn watch(mut view: SessionView) -> Result<()> {
    let mut events = view.mount().await;
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    eprintln!(
        "Watching '{}' as {} (notifications {}). Type to send, /help for commands.",
        view.session(),
        view.role(),
        if view.is_muted() { "muted" } else { "on" }
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ViewEvent::Updated(messages)) => render(&view, &messages),
                Some(ViewEvent::Error(e)) => {
                    eprintln!("⚠ {} [{:?}]", e, e.class());
                    if e.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            line = input.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = handle_input(&view, line.trim()).await {
                        eprintln!("✗ {}", e);
                    }
                }
                Ok(None) => input_open = false,
                Err(e) => {
                    debug!(error = %e, "Stopped reading input");
                    input_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.unmount();
    Ok(())
}

fn render(view: &SessionView, messages: &[Message]) {
    println!();
    if view.role() == Role::Receiver {
        match view.latest_inbound() {
            Some(latest) => {
                println!("┌─ {}", latest.author.display_name);
                println!("│  {}", latest.text);
                println!("└─");
            }
            None => println!("(waiting for the first message)"),
        }
        for (i, reply) in view.suggestions().iter().enumerate() {
            println!("  [s{}] {}", i + 1, reply);
        }
    }

    for message in messages {
        println!("{}", format_message(message, view.profile().identity.as_str()));
    }
}

async fn handle_input(view: &SessionView, line: &str) -> Result<()> {
    if line.is_empty() {
        return Ok(());
    }

    let Some(command) = line.strip_prefix('/') else {
        view.send_text(line).await?;
        return Ok(());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let index = parts.next().map(parse_index).transpose()?;

    match (name, index) {
        ("mute", _) => {
            let muted = view.toggle_mute();
            eprintln!("Notifications {}", if muted { "muted" } else { "on" });
        }
        ("suggest", _) => {
            let replies = view.request_suggestions().await;
            if replies.is_empty() {
                eprintln!("No suggestions available");
            }
            for (i, reply) in replies.iter().enumerate() {
                eprintln!("  [{}] {}", i + 1, reply);
            }
        }
        ("s", Some(i)) => {
            view.reply_suggestion(i).await?;
        }
        ("p", Some(i)) => {
            view.reply_preset(i).await?;
        }
        ("e", Some(i)) => {
            view.reply_emoji(i).await?;
        }
        ("clear", _) => {
            let removed = view.clear_history().await?;
            eprintln!("Removed {} messages", removed);
        }
        _ => print_help(view),
    }

    Ok(())
}

fn print_help(view: &SessionView) {
    eprintln!("Commands:");
    eprintln!("  /mute        toggle notifications");
    eprintln!("  /suggest     generate reply suggestions");
    eprintln!("  /s N         send suggestion N");
    eprintln!("  /p N         send preset N");
    eprintln!("  /e N         send emoji N");
    eprintln!("  /clear       delete the whole history");
    for (i, preset) in view.presets().iter().enumerate() {
        eprintln!("  preset {}: {}", i + 1, preset);
    }
    eprintln!("  emoji: {}", view.emojis().join(" "));
}

/// Dictate from stdin lines and send each utterance.
///
/// A blank line ends the current utterance; end of input or Ctrl-C ends
/// dictation.
pub async fn dictate(view: SessionView, language: &str, refine: bool, send: bool) -> Result<()> {
    let mut engine = SpeechCaptureEngine::new(LineCaptureBackend::stdin(), language);
    let mut transcript = engine.watch_transcript();

    engine.start().await.context("Failed to start dictation")?;
    eprintln!("Listening ({}). Blank line ends an utterance, Ctrl-D finishes.", language);

    let mut pending = false;
    let mut utterances = 0usize;

    loop {
        let restarts = engine.restarts();

        let interrupted = tokio::select! {
            failure = engine.step() => {
                if let Some(e) = failure {
                    if let Some(blocking) = e.to_session_error() {
                        return Err(blocking.into());
                    }
                    debug!(error = %e, "Dictation ended");
                }
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            engine.stop().await;
        }

        if transcript.has_changed().unwrap_or(false) {
            let text = transcript.borrow_and_update().clone();
            eprint!("\r> {}", text);
            pending = !text.is_empty();
        }

        let utterance_ended = engine.restarts() > restarts || !engine.is_listening();
        if utterance_ended && pending {
            eprintln!();
            deliver(&view, &engine.transcript(), refine, send).await?;
            pending = false;
            utterances += 1;
        }

        if !engine.is_listening() {
            break;
        }
    }

    if utterances == 0 {
        eprintln!("Nothing was dictated");
    }
    Ok(())
}

async fn deliver(view: &SessionView, text: &str, refine: bool, send: bool) -> Result<()> {
    let text = if refine {
        view.refine_draft(text).await
    } else {
        text.to_string()
    };

    println!("{}", text);
    if send {
        match view.send_text(&text).await {
            Ok(id) => debug!(%id, "Utterance sent"),
            Err(SendError::EmptyText) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

