//! Helpers for setting up test databases and in-process collaborator fakes.
pub mod mocks;
pub mod prepare_env;

pub use mocks::{TestChain, TestRail};
pub use prepare_env::{create_database, prepare_test_env, random_db_path, run_migrations, seed};
