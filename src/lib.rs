//! gpt-analyzer - ask a language model to review C source code.
//!
//! The binary strips comments from a source file, optionally runs external
//! static analyzers on it, and sends the result to an OpenAI-compatible
//! chat-completion endpoint.
//!
//! # Architecture
//!
//! - `strip`: single-pass comment stripper that keeps string and character
//!   literals intact
//! - `sink`: append-only, NUL-terminated byte accumulator for streamed data
//! - `config`: YAML configuration and API key loading
//! - `analyzers`: external tool runner
//! - `prompt`: prompt assembly and size limits
//! - `client`: chat-completion transport
//! - `report`: output formatting (text, JSON)

pub mod analyzers;
pub mod cli;
pub mod client;
pub mod config;
pub mod prompt;
pub mod report;
pub mod sink;
pub mod strip;

pub use client::{ChatClient, ClientError, Completion};
pub use config::Config;
pub use sink::{ByteSink, SinkError};
pub use strip::{strip_comments, CommentStripper, LexState, Stripped};
