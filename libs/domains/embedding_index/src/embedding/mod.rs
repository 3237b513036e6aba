mod openai;
mod provider;

pub use openai::{OpenAIConfig, OpenAIEmbedder};
pub use provider::Embedder;

#[cfg(test)]
pub use provider::MockEmbedder;
