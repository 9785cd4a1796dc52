pub mod config;
pub mod db;
pub mod extract;
pub mod firecrawl;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod utils;
