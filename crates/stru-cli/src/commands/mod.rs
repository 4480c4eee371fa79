//! Slash commands for interactive mode

mod session;

pub use session::SessionCommand;

use stru_chat::ChatSession;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Clear the conversation and start a new session id
    Clear,
    /// Show a message to the user (not sent to the service)
    Message(String),
    /// Show the logged-in user's profile
    WhoAmI,
    /// Ask the service for a haiku
    Haiku,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, session: &ChatSession) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let command = rest
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "session" | "s" => SessionCommand::execute(session),

        "whoami" | "w" => CommandResult::WhoAmI,

        "haiku" => CommandResult::Haiku,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /session, /s         Show session info
  /whoami, /w          Show the logged-in user
  /haiku               Ask the service for a haiku
  /clear, /c           Clear conversation and start a new session
  /quit, /exit, /q     Exit stru

Press Ctrl-C while an answer is streaming to stop it."#
        .to_string()
}
