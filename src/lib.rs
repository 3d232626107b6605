pub mod browser;
pub mod cache;
pub mod config;
pub mod console;
pub mod logging;
pub mod resolve;
pub mod snapshot;
pub mod spotify;
pub mod token;
pub mod utils;
