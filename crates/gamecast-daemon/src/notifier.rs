//! Turns detected changes into a spoken [`Notification`].

use std::sync::Arc;

use gamecast_core::prompt::{DEFAULT_VOICE, FALLBACK_COMMENTARY, PromptContext, build_prompt};
use gamecast_core::types::{ChangeEvent, MatchSnapshot, Notification};
use thiserror::Error;

use crate::collab::{CollabError, CommentaryGenerator, SpeechSynthesizer};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("speech synthesis failed: {0}")]
    Synthesis(#[source] CollabError),
}

pub struct Notifier {
    generator: Arc<dyn CommentaryGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: String,
}

impl Notifier {
    pub fn new(
        generator: Arc<dyn CommentaryGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            voice: DEFAULT_VOICE.to_string(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Narrate `events` against the snapshot they were detected in.
    ///
    /// `Ok(None)` when nothing significant happened; no collaborator is
    /// called in that case. A generator failure degrades to
    /// [`FALLBACK_COMMENTARY`]; a synthesis failure aborts the cycle.
    pub async fn notify(
        &self,
        events: &[ChangeEvent],
        current: &MatchSnapshot,
    ) -> Result<Option<Notification>, NotifyError> {
        let context = PromptContext::from_snapshot(current);
        let Some(prompt) = build_prompt(events, &context) else {
            tracing::debug!(events = events.len(), "notifier: nothing significant");
            return Ok(None);
        };

        let text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "notifier: commentary failed, using fallback");
                FALLBACK_COMMENTARY.to_string()
            }
        };

        let audio = self
            .synthesizer
            .synthesize(&text, &self.voice)
            .await
            .map_err(NotifyError::Synthesis)?;

        tracing::info!(
            chars = text.len(),
            audio_bytes = audio.len(),
            "notifier: commentary ready"
        );

        Ok(Some(Notification {
            text,
            audio,
            voice: self.voice.clone(),
        }))
    }
}
