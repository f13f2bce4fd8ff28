use std::env;

use chrono::Duration;
use gateway_clients::RailConfig;
use log::*;
use mps_common::Secret;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

const DEFAULT_MPS_HOST: &str = "127.0.0.1";
const DEFAULT_MPS_PORT: u16 = 8360;
const DEFAULT_CREDIT_TERM: Duration = Duration::minutes(30);
const DEFAULT_BANK_TERM: Duration = Duration::hours(72);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The window a credit payment has to settle before the expiry sweep cancels it and returns its stock.
    pub credit_term: Duration,
    /// The window a virtual-account deposit has to arrive before the expiry sweep cancels the order.
    pub bank_term: Duration,
    /// Authentication settings for the rail webhook endpoints.
    pub webhook_auth: WebhookAuthConfig,
    /// Base urls and credentials for the payment rails and the chain issuance gateway.
    pub rails: RailConfig,
}

/// Rail pushes are signed with HMAC-SHA256 over the raw request body. The shared secret is agreed with the rail
/// out of band.
#[derive(Clone, Debug)]
pub struct WebhookAuthConfig {
    pub secret: Secret<String>,
    /// If false, signature checks are skipped entirely. **Never disable this outside of local development.**
    pub enabled: bool,
}

impl Default for WebhookAuthConfig {
    fn default() -> Self {
        Self { secret: Secret::new(String::default()), enabled: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPS_HOST.to_string(),
            port: DEFAULT_MPS_PORT,
            database_url: String::default(),
            credit_term: DEFAULT_CREDIT_TERM,
            bank_term: DEFAULT_BANK_TERM,
            webhook_auth: WebhookAuthConfig::default(),
            rails: RailConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPS_HOST").ok().unwrap_or_else(|| DEFAULT_MPS_HOST.into());
        let port = env::var("MPS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPS_PORT. {e} Using the default, {DEFAULT_MPS_PORT}, instead."
                    );
                    DEFAULT_MPS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPS_PORT);
        let database_url = env::var("MPS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPS_DATABASE_URL is not set. Please set it to the URL for the payment database.");
            String::default()
        });
        let credit_term = env_duration("MPS_CREDIT_TERM_MINUTES", Duration::minutes, DEFAULT_CREDIT_TERM);
        let bank_term = env_duration("MPS_BANK_TERM_HOURS", Duration::hours, DEFAULT_BANK_TERM);
        let webhook_auth = WebhookAuthConfig::from_env_or_default();
        let rails = RailConfig::new_from_env_or_default();
        Self { host, port, database_url, credit_term, bank_term, webhook_auth, rails }
    }
}

impl WebhookAuthConfig {
    pub fn from_env_or_default() -> Self {
        let enabled = env::var("MPS_SKIP_WEBHOOK_SIGNATURE").map(|s| &s != "1" && &s != "true").unwrap_or(true);
        if !enabled {
            warn!("🪛️ MPS_SKIP_WEBHOOK_SIGNATURE is set. Rail webhook signatures will NOT be checked. **DANGER**");
            return Self { secret: Secret::new(String::default()), enabled };
        }
        let secret = env::var("MPS_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            let random_secret = thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect::<String>();
            warn!(
                "🪛️ MPS_WEBHOOK_SECRET is not set. A random secret has been generated, which means every incoming \
                 rail push will be rejected. Set MPS_WEBHOOK_SECRET to the secret agreed with the rail."
            );
            random_secret
        });
        Self { secret: Secret::new(secret), enabled }
    }
}

fn env_duration(var: &str, unit: fn(i64) -> Duration, default: Duration) -> Duration {
    match env::var(var) {
        Ok(s) => match s.parse::<i64>() {
            Ok(n) if n > 0 => unit(n),
            _ => {
                error!("🪛️ {s} is not a valid value for {var}. Using the default instead.");
                default
            },
        },
        Err(_) => default,
    }
}
