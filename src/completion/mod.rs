//! Completion Service: contract, HTTP client, and reply parsing.
//!
//! The final completion call is the only stage whose failure is fatal to a
//! chat request. Its reply always resolves to a `ParsedResponse`.

pub mod client;
pub mod errors;
pub mod json_repair;
pub mod response_parser;
pub mod types;

pub use client::{CompletionService, ResponsesClient};
pub use errors::{CompletionError, CompletionErrorKind};
pub use response_parser::{parse_response, ParsedResponse, Section, SectionBody};
pub use types::{CompletionRequest, InputMessage, Role};
