pub const VOICE_API_KEY: &str = "VOICE_API_KEY";
pub const VOICE_BASE_URL: &str = "VOICE_BASE_URL";

pub const BASE_URL: &str = "wss://api.voice-provider.example/v1";
pub const CALL_PATH: &str = "call";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
