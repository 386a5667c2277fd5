pub mod app;
pub mod apps;
pub mod bars;
pub mod cache;
pub mod config;
pub mod context;
pub mod directory;
pub mod entry;
pub mod keys;
pub mod markers;
pub mod mime;
pub mod navigator;
pub mod preview;
pub mod scheduler;
pub mod transfer;
pub mod ui;
