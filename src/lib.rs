pub mod backend;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod util;
