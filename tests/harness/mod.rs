#![allow(dead_code)]

pub mod app;
pub mod mock_provider;
pub mod store;
