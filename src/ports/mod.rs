//! Port traits the domain talks to.

pub mod config_port;
pub mod price_port;
pub mod experiment_store;
pub mod report_port;
