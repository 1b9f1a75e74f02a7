pub mod analysis;
pub mod application;
pub mod crawl;
pub mod error;
pub mod indexes;
pub mod query;
pub mod stats;
pub mod tools;
