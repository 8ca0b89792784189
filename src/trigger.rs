use crate::persona::ASSISTANT_GREETINGS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Not for the assistant. Eligible for XP.
    NotAddressed,
    /// Addressed, but there is nothing to answer.
    Silent,
    Prompt(String),
}

/// A message is addressed when it starts with a mention of the assistant or
/// replies to one of its messages. Every mention of the assistant is removed
/// from the prompt. A bare mention becomes a greeting. A bare reply is ignored,
/// even when it also carries a mention.
pub fn detect(content: &str, assistant_id: u64, replies_to_assistant: bool) -> Trigger {
    let mentions = [format!("<@{}>", assistant_id), format!("<@!{}>", assistant_id)];
    let trimmed = content.trim_start();
    let is_mention = mentions.iter().any(|m| trimmed.starts_with(m.as_str()));

    if !is_mention && !replies_to_assistant {
        return Trigger::NotAddressed;
    }

    let prompt = mentions
        .iter()
        .fold(content.to_string(), |text, m| text.replace(m.as_str(), ""))
        .trim()
        .to_string();

    match (prompt.is_empty(), replies_to_assistant) {
        (false, _) => Trigger::Prompt(prompt),
        (true, true) => Trigger::Silent,
        (true, false) => Trigger::Prompt(ASSISTANT_GREETINGS[0].to_string()),
    }
}
