//! Provider adapters over concrete backend APIs.

pub mod openai;

pub use openai::{OLLAMA_BASE_URL, OPENAI_BASE_URL, OpenAiCompatProvider};
