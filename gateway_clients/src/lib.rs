//! HTTP clients for the engine's external collaborators.
//!
//! [`GatewayRailClient`] implements the engine's `PaymentRail` trait against the payment provider's REST API, and
//! [`ChainApiClient`] implements `ChainIssuer` against the asset-chain service. Neither holds any business logic;
//! they translate between the engine's types and the providers' wire formats and keep the chain service's access
//! token fresh.
mod chain;
mod config;
mod data_objects;
mod rail;
mod session;

pub use chain::ChainApiClient;
pub use config::RailConfig;
pub use rail::GatewayRailClient;
pub use session::{AccessToken, TokenSession, TokenSource};
