mod client;
mod config;

pub use client::PineconeBackend;
pub use config::PineconeConfig;
