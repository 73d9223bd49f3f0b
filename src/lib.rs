//! Library crate for ktron: drive nmap through a small HTTP service and keep
//! per-host results on disk.
pub mod client;
pub mod error;
pub mod logging;
pub mod profiles;
pub mod recon;
pub mod report;
pub mod scanner;
pub mod server;
pub mod store;
pub mod types;
