pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod orchestrator;
pub mod page;
pub mod present;
pub mod prompt;
pub mod protocol;
pub mod remote;
pub mod review;
pub mod service;
pub mod store;
