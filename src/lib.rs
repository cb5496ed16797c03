pub mod catalog;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod sources;
pub mod utils;
