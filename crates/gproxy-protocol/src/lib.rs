pub mod chat;
pub mod error;
pub mod images;
pub mod sse;

pub use chat::{
    ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatCompletionStreamChoice,
    ChatCompletionStreamChunk, ChatMessage,
};
pub use error::{ErrorBody, ErrorDetail};
pub use images::{ImageGenerationRequest, ImageGenerationResponse};
pub use sse::{SseEvent, SseParser};
