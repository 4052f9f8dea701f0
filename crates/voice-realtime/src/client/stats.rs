#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    messages_received: u64,
    transcripts_received: u64,
    errors_received: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, event: &crate::types::ServerEvent) {
        self.messages_received += 1;
        match event {
            crate::types::ServerEvent::Message(_) => self.transcripts_received += 1,
            crate::types::ServerEvent::Error(_) => self.errors_received += 1,
            _ => {}
        }
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn transcripts_received(&self) -> u64 {
        self.transcripts_received
    }

    pub fn errors_received(&self) -> u64 {
        self.errors_received
    }
}
