//! Ordered message log for the current chat.
//!
//! Messages keep arrival order; nothing is re-sorted or deduplicated.
//! Entries are mutated in place by id and only ever removed wholesale.

use ticketdesk_shared::{Message, MessageStatus, MessageType};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the log.
    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Replace the full log (server transcript, or a fresh welcome).
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Apply `f` to the message with `id`. Returns false if there is none.
    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut Message)) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) => {
                f(msg);
                true
            }
            None => false,
        }
    }

    pub fn set_status(&mut self, id: &str, status: MessageStatus) -> bool {
        self.update(id, |m| m.status = Some(status))
    }

    /// Whether an inline form has already been shown.
    pub fn contains_form(&self) -> bool {
        self.messages.iter().any(|m| m.r#type == MessageType::Form)
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_from_user()).count()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_arrival_order_and_duplicates() {
        let mut log = MessageLog::new();
        let a = Message::agent_text("a");
        let b = Message::agent_text("b");
        log.push(a.clone());
        log.push(b.clone());
        log.push(a.clone());

        let contents: Vec<_> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "a"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn status_updates_in_place() {
        let mut log = MessageLog::new();
        let msg = Message::user_text("hi", MessageStatus::Sent);
        let id = msg.id.clone();
        log.push(msg);

        assert!(log.set_status(&id, MessageStatus::Read));
        assert_eq!(log.find(&id).unwrap().status, Some(MessageStatus::Read));
        assert!(!log.set_status("m_missing", MessageStatus::Read));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn counts_user_messages_and_forms() {
        let mut log = MessageLog::from(vec![Message::agent_text("welcome")]);
        assert_eq!(log.user_message_count(), 0);
        assert!(!log.contains_form());

        log.push(Message::user_text("hi", MessageStatus::Sent));
        log.push(Message::agent_form("What is your email address?", &["email"]));
        assert_eq!(log.user_message_count(), 1);
        assert!(log.contains_form());
    }
}
