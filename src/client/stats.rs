use live_voice_types::events::server::UsageMetadata;

/// Token usage accumulated over every connection of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    prompt_tokens: u64,
    response_tokens: u64,
    total_tokens: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, usage: &UsageMetadata) {
        self.prompt_tokens += u64::from(usage.prompt_token_count);
        self.response_tokens += u64::from(usage.response_token_count);
        self.total_tokens += u64::from(usage.total_token_count);
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn response_tokens(&self) -> u64 {
        self.response_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }
}
