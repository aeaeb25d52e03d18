pub mod browser;
pub mod config;
pub mod credentials;
pub mod dialog;
pub mod duration;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod watcher;
