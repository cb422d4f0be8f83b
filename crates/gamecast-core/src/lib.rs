//! gamecast-core: pure match-commentary logic.
//! Snapshot model, change detection, significance filtering and prompt
//! assembly, payload adaptation, wire codec, and session lifecycle.
//! No IO, no async.

pub mod detect;
pub mod payload;
pub mod prompt;
pub mod session;
pub mod types;
pub mod wire;

pub use detect::{ChangeDetector, DetectorConfig};
pub use payload::{LiveGamePayload, PayloadError};
pub use prompt::{DEFAULT_VOICE, FALLBACK_COMMENTARY, PromptContext, build_prompt};
pub use session::{Session, SessionError, SessionState};
pub use types::{
    ChangeDetail, ChangeEvent, ChangeKind, MatchSnapshot, Notification, PlayerSnapshot, StatLine,
};
pub use wire::{Inbound, WireError, decode_message, encode_notification};
