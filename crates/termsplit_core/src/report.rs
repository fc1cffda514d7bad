use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

/// Ordered progress and diagnostic lines returned alongside every report.
/// Each entry is mirrored to `tracing` as it is recorded.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{text}");
        self.entries.push(Message {
            level: MessageLevel::Info,
            text,
        });
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{text}");
        self.entries.push(Message {
            level: MessageLevel::Warning,
            text,
        });
    }

    /// Append entries from a sub-phase without re-emitting them.
    pub fn extend(&mut self, other: &MessageLog) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Message> {
        self.entries
            .iter()
            .filter(|message| message.level == MessageLevel::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
