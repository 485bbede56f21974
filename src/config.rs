use anyhow::bail;
use clap::Parser;
use std::time::Duration;

use crate::rate_limit::RateLimitScope;

pub const DEFAULT_UPSTREAM_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image-preview:generateContent";

// CLI argument structure, every flag can also come from the environment / .env
#[derive(Parser, Debug, Clone)]
#[command(name = "photobooth-proxy")]
#[command(about = "Keeps the image API key server-side and forwards photobooth requests")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 5001)]
    pub port: u16,

    // Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Credential attached to every upstream call
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Image generation endpoint
    #[arg(short, long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    // Upstream timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub upstream_timeout: u64,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 10)]
    pub rate_limit: usize,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Share one window across all callers, or keep one per client ip
    #[arg(long, value_enum, default_value_t = RateLimitScope::Global)]
    pub rate_limit_scope: RateLimitScope,

    // Max accepted request body in MiB (photos arrive inline as base64)
    #[arg(long, default_value_t = 20)]
    pub max_body_mb: usize,

    // Start without a key and answer each proxy call with a config error instead
    #[arg(long, default_value_t = false)]
    pub allow_missing_key: bool,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb * 1024 * 1024
    }

    // Blank keys count as missing
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    // Missing key is fatal unless --allow-missing-key, then each proxy call reports it instead
    pub fn require_api_key(&self) -> anyhow::Result<Option<String>> {
        match self.api_key() {
            Some(key) => Ok(Some(key)),
            None if self.allow_missing_key => Ok(None),
            None => bail!("GEMINI_API_KEY not found in environment or .env file"),
        }
    }
}

// Show enough of the key to recognise it in logs
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
