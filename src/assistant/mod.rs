//! The Assistant Process collaborator: spawns and speaks to an external programming
//! assistant subprocess over newline-delimited JSON (spec §4.2).

pub mod process;
pub mod protocol;

pub use process::{AssistantProcess, SpawnConfig, StreamItem};
pub use protocol::{AssistantEvent, ContentBlock, ResultEvent, SystemEvent, UserMessage};
