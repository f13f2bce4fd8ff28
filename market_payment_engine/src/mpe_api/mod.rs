//! # Market payment engine public API
//!
//! The `mpe_api` module exposes the programmatic API for the payment engine. The API is modular so that clients can
//! pick the functionality they need; each API instance is created by supplying a database backend implementing
//! [`crate::traits::PaymentGatewayDatabase`], plus the external collaborators the flow talks to.
//!
//! * [`checkout_api`] turns purchase requests into durable, reserved order attempts and initiates them on a rail.
//! * [`reconciler_api`] applies settlement webhook batches to the ledger, exactly once per push id.
//! * [`issuance_api`] mints and transfers on-chain certificates for settled asset-backed orders.
//! * [`order_api`] answers status polls, runs the expiry sweep and handles support cancellations.
pub mod checkout_api;
pub mod errors;
pub mod issuance_api;
pub mod order_api;
pub mod order_objects;
pub mod reconciler_api;

pub use checkout_api::CheckoutApi;
pub use errors::{CheckoutApiError, IssuanceApiError};
pub use issuance_api::IssuanceApi;
pub use order_api::OrderApi;
pub use order_objects::{
    BatchSummary,
    CheckoutReceipt,
    CheckoutRequest,
    OrderStatusResult,
    PaymentInstrument,
    RailReceipt,
};
pub use reconciler_api::ReconcilerApi;
