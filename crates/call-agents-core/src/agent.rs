//! Agent persona configuration.

use serde::{Deserialize, Serialize};

/// Fallback instructions when an agent has none configured.
const DEFAULT_INSTRUCTIONS: &str = "You are a helpful AI assistant.";

/// Default voice selection.
pub const DEFAULT_VOICE: &str = "alloy";

/// Default speech-to-text model.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Server-side voice-activity-detection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    /// Energy threshold above which speech is detected.
    pub threshold: f32,
    /// Audio to include before detected speech, in milliseconds.
    pub prefix_padding_ms: u32,
    /// Silence required before the agent takes its turn, in milliseconds.
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            prefix_padding_ms: 500,
            silence_duration_ms: 800,
        }
    }
}

/// A configured AI persona attachable to a meeting.
///
/// Loaded once per connect from the agent's stored configuration and
/// immutable for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersona {
    /// Unique agent identifier, also used as the call participant identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text persona instructions. Empty falls back to a generic persona.
    pub instructions: String,
    /// Voice selection.
    pub voice: String,
    /// Turn-detection tuning.
    pub turn_detection: TurnDetection,
    /// Speech-to-text model for input transcription.
    pub transcription_model: String,
}

impl AgentPersona {
    /// Create a persona with default voice and tuning.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: String::new(),
            voice: DEFAULT_VOICE.to_string(),
            turn_detection: TurnDetection::default(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        }
    }

    /// Set the persona instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// Turn-detection section of a session configuration update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerVad {
    /// Detection mode; always `server_vad`.
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// Input-transcription section of a session configuration update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

/// Configuration applied to an open realtime session.
///
/// Field layout matches the realtime provider's `session.update` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub instructions: String,
    pub voice: String,
    pub turn_detection: ServerVad,
    pub input_audio_transcription: TranscriptionConfig,
}

impl SessionUpdate {
    /// Build the session configuration for a persona.
    #[must_use]
    pub fn from_persona(persona: &AgentPersona) -> Self {
        let instructions = if persona.instructions.is_empty() {
            DEFAULT_INSTRUCTIONS.to_string()
        } else {
            persona.instructions.clone()
        };

        Self {
            instructions,
            voice: persona.voice.clone(),
            turn_detection: ServerVad {
                kind: "server_vad".to_string(),
                threshold: persona.turn_detection.threshold,
                prefix_padding_ms: persona.turn_detection.prefix_padding_ms,
                silence_duration_ms: persona.turn_detection.silence_duration_ms,
            },
            input_audio_transcription: TranscriptionConfig {
                model: persona.transcription_model.clone(),
            },
        }
    }
}
