pub mod admin;
pub mod builder;
pub mod schema;
pub mod service;
