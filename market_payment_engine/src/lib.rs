//! Market Payment Engine
//!
//! The Market Payment Engine is the order and payment reconciliation core for the marketplace: it owns the pending
//! payment ledger, the stock and token-id reservations, the settlement reconciler and the on-chain issuance
//! orchestrator. This library contains the core logic and is server-agnostic.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly.
//!    Instead, use the public API provided by the engine. The exception is the data types stored in the database,
//!    which are defined in [`mod@db_types`] and are public.
//! 2. The engine public API ([`mod@mpe_api`]). Each API is generic over the backend and collaborator traits in
//!    [`mod@traits`], so tests substitute in-process fakes for the database, the payment rails and the chain
//!    service.
//!
//! The engine also emits events when orders settle, cancel, or have assets minted and transferred. A simple actor
//! framework ([`mod@events`]) lets the server hook into these and trigger follow-up work, such as minting after
//! settlement.

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod mpe_api;
pub mod rail_types;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use mpe_api::{
    errors::{CheckoutApiError, IssuanceApiError},
    order_objects,
    CheckoutApi,
    IssuanceApi,
    OrderApi,
    ReconcilerApi,
};
pub use traits::{InsertHistoryResult, PaymentGatewayDatabase, PaymentGatewayError, TransitionResult};
