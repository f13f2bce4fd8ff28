//! # Market payment server
//! This module hosts the HTTP surface for the payment gateway. It is responsible for:
//! Accepting checkout requests from the storefront and opening payment windows on the rails.
//! Listening for incoming settlement webhooks from the credit and virtual-account rails.
//! Verifying webhook signatures and handing the batches to the reconciler.
//! Exposing order status, cancellation, and operator endpoints.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/checkout/{credit,bank}`: Open a new payment attempt on the given rail.
//! * `/webhook/{credit,bank}`: The webhook routes for receiving settlement pushes from the rails.
//! * `/status/...`, `/history/...`: Order lookups by order id or rail reference.
//! * `/cancel`, `/transfer`, `/admin/...`: Cancellation, certificate transfer, and operator views.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod routes;
pub mod server;
pub mod webhook_routes;

#[cfg(test)]
mod endpoint_tests;
