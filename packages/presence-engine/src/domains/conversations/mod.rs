//! Scripted conversations: the catalog and the repeat-avoiding picker.

pub mod catalog;
pub mod models;
pub mod picker;

pub use catalog::ConversationCatalog;
pub use models::{BotProfile, Conversation, ScriptedMessage};
pub use picker::{pick_conversation, RecentConversations};
