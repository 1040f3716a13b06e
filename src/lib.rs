pub mod amplitude;
pub mod config;
pub mod logging;
pub mod stages;
pub mod store;
