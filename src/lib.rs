pub mod config;
pub mod crawl;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod output;
pub mod series;
pub mod services;
pub mod stats;
pub mod table;
