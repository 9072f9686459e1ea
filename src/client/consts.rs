pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const BASE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-live-2.5-flash-preview";

pub const DEFAULT_CAPACITY: usize = 1024;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const CLOSE_TIMEOUT_MS: u64 = 500;
