//! Wire protocol for the Lingumate handshake and relay endpoints.
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound frames
//! are decoded once, at the socket boundary, into [`ClientMessage`]; outbound
//! frames are built from [`ServerMessage`].

pub mod error;
pub mod language;
pub mod message;

pub use error::{ErrorCode, ErrorFrame};
pub use language::{LanguagePair, LanguageTag, LanguageTagError};
pub use message::{
    ClientMessage, ClosureReason, DecodeError, ParticipantInfo, ServerMessage, SessionState,
    TranslationResult, decode_client_message,
};
