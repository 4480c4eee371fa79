//! Plain terminal rendering of chat events

use crate::utils::format_button;
use std::io::{self, Write};
use stru_api::{ChatMessage, Completion};
use stru_chat::ChatEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Print streamed text as it arrives, until the turn ends
pub fn spawn_printer(mut receiver: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = TurnRenderer::default();
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    print_event(&mut renderer, &event);
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Output fell behind, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(renderer: &mut TurnRenderer, event: &ChatEvent) {
    let mut stdout = io::stdout().lock();
    if let Err(e) = renderer.render(&mut stdout, event) {
        tracing::debug!("stdout write failed: {}", e);
    }
}

/// Wait for the printer to drain the turn's events.
///
/// Turns rejected up front publish nothing, so the printer is stopped instead.
pub async fn finish_printer(printer: JoinHandle<()>, turn_started: bool) {
    if turn_started {
        let _ = printer.await;
    } else {
        printer.abort();
    }
}

/// Renders the events of one turn
#[derive(Debug, Default)]
pub struct TurnRenderer {
    message_opened: bool,
}

impl TurnRenderer {
    /// Write one event to the terminal.
    ///
    /// Errors are reported by the caller from the turn result, not here.
    pub fn render(&mut self, out: &mut impl Write, event: &ChatEvent) -> io::Result<()> {
        match event {
            ChatEvent::MessageStart { .. } => {
                self.message_opened = true;
                Ok(())
            }
            ChatEvent::MessageUpdate { delta } => {
                write!(out, "{}", delta)?;
                out.flush()
            }
            ChatEvent::MessageEnd {
                message,
                completion,
            } => render_footer(out, message, *completion),
            ChatEvent::DecodeWarning { message } => {
                tracing::debug!("skipped stream line: {}", message);
                Ok(())
            }
            // Aborted before the answer started
            ChatEvent::TurnEnd {
                completion: Some(Completion::Cancelled),
            } if !self.message_opened => {
                writeln!(out, "[aborted]")?;
                out.flush()
            }
            _ => Ok(()),
        }
    }
}

fn render_footer(out: &mut impl Write, message: &ChatMessage, completion: Completion) -> io::Result<()> {
    writeln!(out)?;

    match completion {
        Completion::Done => {}
        Completion::Truncated => writeln!(out, "[response ended early]")?,
        Completion::Cancelled => writeln!(out, "[aborted]")?,
    }

    if !message.buttons.is_empty() {
        writeln!(out)?;
        for (i, button) in message.buttons.iter().enumerate() {
            writeln!(out, "{}", format_button(i, button))?;
        }
    }

    if let Some(model) = &message.model {
        writeln!(out, "[{}]", model)?;
    }

    writeln!(out)?;
    out.flush()
}
