// Shared modules for the relayer and onboarding services
pub mod chain_client;
pub mod config;
pub mod funds_controller;
pub mod l1;
pub mod metrics;
pub mod service;
pub mod shared;
pub mod signer;
pub mod utils;
