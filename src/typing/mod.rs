//! Word-to-keystroke dispatch
//!
//! Words recommended by the planner are queued here and typed into the game
//! window by a single background worker, one character at a time.
//!
//! # Features
//!
//! - **Deduplication**: A word already waiting (or being typed) is not queued again
//! - **FIFO dispatch**: Words are typed in the order they were requested
//! - **Window activation**: The game window is re-located and focused before every word
//! - **Human pacing**: Fixed pause between characters, games drop bursts of synthetic input
//! - **Prompt shutdown**: Stop is observed between words and between characters

mod dispatcher;
mod input;
mod queue;

pub use dispatcher::{
    DispatchError, DispatchStats, DispatchTiming, DispatcherState, InputDispatcher, StopHandle,
};
#[cfg(feature = "desktop")]
pub use input::EnigoSink;
pub use input::{InputMethod, KeystrokeSink, TypingError};
pub use queue::{Word, WordQueue};
