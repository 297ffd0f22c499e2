use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Twilio
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_sms_from: String,
    pub twilio_whatsapp_from: String,

    // Outbound rate limits (per minute)
    pub sms_rate_per_minute: u32,
    pub whatsapp_rate_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            twilio_account_sid: required_env("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: required_env("TWILIO_AUTH_TOKEN"),
            twilio_sms_from: required_env("TWILIO_SMS_FROM"),
            twilio_whatsapp_from: required_env("TWILIO_WHATSAPP_FROM"),
            sms_rate_per_minute: optional_env_u32("SMS_RATE_PER_MINUTE", 30),
            whatsapp_rate_per_minute: optional_env_u32("WHATSAPP_RATE_PER_MINUTE", 20),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn optional_env_u32(key: &str, default: u32) -> u32 {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
