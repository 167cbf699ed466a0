//! Google Gemini `generateContent` client, used as the summarizer's language model.

pub mod client;
mod types;

pub use client::GeminiClient;
