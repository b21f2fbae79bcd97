pub mod config;
pub mod logging;

pub mod batch;
pub mod bridge;
pub mod directive;
pub mod engine;
pub mod mitigation;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod reset;
pub mod session;
