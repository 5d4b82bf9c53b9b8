//! Chat stream processing and conversation persistence core.
//!
//! Consumes a finished (or failing) language-model response, assembles it into
//! typed message parts, reconciles those against previously persisted turns,
//! and commits them to conversation storage off the request path.

pub mod models;
pub mod repositories;
pub mod services;

pub use models::chat_request::{CallerIdentity, ChatRequest, IncomingMessage};
pub use models::message::{MessagePart, MessageRole, ToolInvocationState};
pub use repositories::{
    ConversationRecord, ConversationStore, InMemoryConversationStore, MessageRecord, NewMessage,
    SqliteConversationStore, StoreError, StoreResult,
};
pub use services::lifecycle::{ConversationLifecycle, LifecycleError, SessionOutcome};
pub use services::persistence_gateway::{PersistenceGateway, SaveReceipt, SaveRequest};
pub use services::stream_processor::{
    ModelResponse, ProcessedResponse, StaticModelResponse, ToolCall, ToolOutcome,
    process_stream_result,
};
pub use services::text_extractor::extract_text_from_parts;
