pub mod config;
pub mod dispatcher;
pub mod error;
pub mod image_processing;
pub mod prompt;
pub mod providers;
pub mod size;
pub mod storage;
pub mod web;
