//! Backend implementations for ClawRun.
//!
//! All backends implement the `clawrun_core::Backend` trait. The stock
//! backend speaks the OpenAI chat-completions streaming protocol, which
//! covers OpenRouter, OpenAI, Ollama and most hosted gateways.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatBackend;
