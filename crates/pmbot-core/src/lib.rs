//! Foundational utilities shared across the bot crates.
//!
//! Provides atomic state-file writes, time helpers, the shared error kinds and
//! text shaping for chat delivery and the retry policy used by the HTTP
//! clients.

pub mod atomic_io;
pub mod error;
pub mod retry;
pub mod text;
pub mod time_utils;

pub use atomic_io::{read_text_if_exists, write_text_atomic};
pub use error::{BotError, BotErrorKind};
pub use retry::RetryPolicy;
pub use text::{chunk_text, truncate_chars};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, window_elapsed};
