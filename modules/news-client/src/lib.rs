pub mod openai;
pub mod provider;
pub mod salvage;

pub use openai::OpenAiCompatibleProvider;
pub use provider::{ChatCompletion, ChatMessage, ChatRequest, FinishReason, LlmProvider, Role};
pub use salvage::{salvage_json, strip_code_fences};
