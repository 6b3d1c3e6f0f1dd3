mod chat;
mod intent;
mod tool;
pub mod ui;

pub use chat::{ChatMessage, ChatMetadata, ChatRequest, ChatResponse, Role, SuggestionMessage};
pub use intent::Intent;
pub use tool::{ToolContext, ToolSource, ToolSpec};
pub use ui::FeatureInstruction;
