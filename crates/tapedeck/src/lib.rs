pub mod cli;
pub mod config;
pub mod keyboard;
pub mod library;
pub mod memory;
pub mod output;
pub mod runtime;
