pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod server;
pub mod workspace;
