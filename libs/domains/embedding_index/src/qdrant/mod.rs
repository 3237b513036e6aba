mod client;
mod config;

pub use client::QdrantBackend;
pub use config::QdrantConfig;
