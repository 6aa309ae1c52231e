//! 会话层：每个用户一份对话状态，以及按用户索引的会话存储

mod records;
#[allow(clippy::module_inception)]
mod session;
mod store;

pub use records::{
    ActiveContexts, CompletionState, ContextOrigin, ContextRecord, IncompleteStack, IntentRecord,
    RecordId,
};
pub use session::{Session, SessionSummary};
pub use store::{MemorySessionStore, SessionHandle, SessionStore};
