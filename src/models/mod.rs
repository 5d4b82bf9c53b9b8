pub mod chat_request;
pub mod message;

pub use chat_request::{CallerIdentity, ChatRequest, IncomingMessage};
pub use message::{MessagePart, MessageRole, ToolInvocationState};
