// Clipscope Infrastructure - Inference Adapter
// Implements: Analyzer (OpenAI-compatible chat completions with image input)

mod chat_completions;
mod prompt;

pub use chat_completions::{ChatCompletionsAnalyzer, ChatCompletionsConfig};
