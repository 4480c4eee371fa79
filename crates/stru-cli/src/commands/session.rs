//! /session command - show session info

use super::CommandResult;
use crate::utils::count_by_sender;
use stru_chat::ChatSession;

pub struct SessionCommand;

impl SessionCommand {
    pub fn execute(session: &ChatSession) -> CommandResult {
        let context = session.context();
        let conversation = session.conversation();
        let messages = conversation.messages();

        let mut output = String::from("Session Info\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');

        output.push_str(&format!("User:       {}\n", context.user_id));
        output.push_str(&format!("Session:    {}\n", context.session_id));
        output.push_str(&format!(
            "Logged in:  {}\n",
            if context.token.is_some() { "yes" } else { "no" }
        ));
        output.push('\n');

        if conversation.is_empty() {
            output.push_str("Messages:   none yet\n");
        } else {
            let (user_msgs, assistant_msgs) = count_by_sender(messages);
            output.push_str(&format!("Messages:   {} total\n", conversation.len()));
            output.push_str(&format!(
                "            {} user, {} assistant\n",
                user_msgs, assistant_msgs
            ));
        }

        let model = messages.iter().rev().find_map(|m| m.model.as_deref());
        if let Some(model) = model {
            output.push_str(&format!("Model:      {}\n", model));
        }

        if let Some(error) = &conversation.error {
            output.push_str(&format!("Last error: {}\n", error));
        }

        CommandResult::Message(output)
    }
}
