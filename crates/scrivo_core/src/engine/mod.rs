//! Turn-based streaming transcription engine.
//!
//! A session walks the provider through the media one turn at a time:
//! each response is parsed as JSONL segments, appended to the running
//! transcript, checkpointed to disk, and then the next continuation
//! prompt is chosen from what the turn contained.

pub mod parser;
pub mod prompts;
pub mod session;

pub use parser::{parse_turn, TurnParse, END_TOKEN};
pub use session::{
    load_checkpoint, EngineConfig, EngineError, EngineOutcome, ScribeEngine, StopReason,
};
