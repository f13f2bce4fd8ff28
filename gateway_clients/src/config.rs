use log::*;
use mps_common::Secret;

#[derive(Debug, Clone)]
pub struct RailConfig {
    pub credit_base_url: String,
    pub bank_base_url: String,
    pub chain_base_url: String,
    pub chain_api_key: Secret<String>,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            credit_base_url: "http://localhost:9701".to_string(),
            bank_base_url: "http://localhost:9702".to_string(),
            chain_base_url: "http://localhost:9703".to_string(),
            chain_api_key: Secret::new("unset".to_string()),
        }
    }
}

impl RailConfig {
    pub fn new_from_env_or_default() -> Self {
        let default = Self::default();
        let credit_base_url = std::env::var("MPS_CREDIT_RAIL_URL").unwrap_or_else(|_| {
            warn!("MPS_CREDIT_RAIL_URL not set, using {}", default.credit_base_url);
            default.credit_base_url.clone()
        });
        let bank_base_url = std::env::var("MPS_BANK_RAIL_URL").unwrap_or_else(|_| {
            warn!("MPS_BANK_RAIL_URL not set, using {}", default.bank_base_url);
            default.bank_base_url.clone()
        });
        let chain_base_url = std::env::var("MPS_CHAIN_API_URL").unwrap_or_else(|_| {
            warn!("MPS_CHAIN_API_URL not set, using {}", default.chain_base_url);
            default.chain_base_url.clone()
        });
        let chain_api_key = Secret::new(std::env::var("MPS_CHAIN_API_KEY").unwrap_or_else(|_| {
            warn!("MPS_CHAIN_API_KEY not set, using a (probably useless) default");
            "unset".to_string()
        }));
        Self { credit_base_url, bank_base_url, chain_base_url, chain_api_key }
    }
}
