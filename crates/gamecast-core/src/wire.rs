//! Broadcast wire format.
//!
//! Notifications travel as a single JSON text frame:
//!
//! ```json
//! {"event": "tts", "data": {"text": "...", "voice": "onyx", "audio": "<base64>"}}
//! ```
//!
//! Liveness uses the bare tokens `ping` / `pong` outside the envelope.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::DEFAULT_VOICE;
use crate::types::Notification;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("tts event carries no audio")]
    MissingAudio,

    #[error("audio is not valid base64: {0}")]
    Audio(#[from] base64::DecodeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TtsData {
    #[serde(default)]
    text: String,
    #[serde(default = "default_voice")]
    voice: String,
    #[serde(default)]
    audio: String,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    event: String,
    #[serde(default)]
    data: T,
}

/// Classified inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ping,
    Pong,
    Notification(Notification),
    /// Well-formed JSON with an event name this side does not handle.
    UnknownEvent(String),
    /// Neither JSON nor a liveness token.
    Unrecognized(String),
}

/// Encode a notification as one JSON text frame.
pub fn encode_notification(notification: &Notification) -> Result<String, WireError> {
    let envelope = Envelope {
        event: "tts".to_string(),
        data: TtsData {
            text: notification.text.clone(),
            voice: notification.voice.clone(),
            audio: STANDARD.encode(&notification.audio),
        },
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Classify and decode an inbound text frame.
///
/// Errors only for a `tts` envelope whose audio is missing or undecodable.
pub fn decode_message(text: &str) -> Result<Inbound, WireError> {
    match text {
        PING => return Ok(Inbound::Ping),
        PONG => return Ok(Inbound::Pong),
        _ => {}
    }

    let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(text) else {
        return Ok(Inbound::Unrecognized(text.to_string()));
    };
    if envelope.event != "tts" {
        return Ok(Inbound::UnknownEvent(envelope.event));
    }

    let data: TtsData = if envelope.data.is_null() {
        serde_json::from_value(serde_json::json!({}))?
    } else {
        serde_json::from_value(envelope.data)?
    };
    if data.audio.is_empty() {
        return Err(WireError::MissingAudio);
    }
    let audio = STANDARD.decode(data.audio.as_bytes())?;

    Ok(Inbound::Notification(Notification {
        text: data.text,
        audio,
        voice: data.voice,
    }))
}
