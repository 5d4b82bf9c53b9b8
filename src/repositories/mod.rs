pub mod conversation_store;
pub mod error;
pub mod in_memory_store;
pub mod sqlite_store;

pub use conversation_store::{ConversationRecord, ConversationStore, MessageRecord, NewMessage};
pub use error::{StoreError, StoreResult};
pub use in_memory_store::InMemoryConversationStore;
pub use sqlite_store::SqliteConversationStore;
