// Library module for sharecrawl
// Re-exports modules for use in integration tests and the CLI

pub mod config;
pub mod crawl;
pub mod fault;
pub mod logging;
pub mod rules;
pub mod store;
pub mod version;
