pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod facts;
pub mod logging;
pub mod model;
pub mod playlist;
pub mod report;
pub mod search;
