pub mod chain;
pub mod config;
pub mod reset;
pub mod status;
