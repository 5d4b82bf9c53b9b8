pub mod dedup;
pub mod lifecycle;
pub mod persistence_gateway;
pub mod stream_processor;
pub mod text_extractor;
pub mod title_generator;

pub use dedup::filter_consecutive_duplicates;
pub use lifecycle::{ConversationLifecycle, LifecycleError, SessionOutcome};
pub use persistence_gateway::{PersistenceGateway, SaveReceipt};
pub use stream_processor::{ModelResponse, ProcessedResponse, process_stream_result};
pub use text_extractor::extract_text_from_parts;
pub use title_generator::{derive_title_from_text, generate_title};
