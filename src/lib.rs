pub mod app;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod golden;
pub mod harvest;
pub mod identifiers;
pub mod labels;
pub mod openalex;
pub mod output;
pub mod scrape;
pub mod store;
pub mod taxonomy;
pub mod validate;
