/**
 * ============================================================================
 * ERROR MODULE
 * ============================================================================
 *
 * PURPOSE: Single error taxonomy for the capture and finalization engine
 *
 * CATEGORIES:
 * - Device: capture device unavailable or disconnected (fatal to the session)
 * - Encoding: external media encoder failed (intermediates kept on disk)
 * - State: request not valid in the current session phase (no side effect)
 *
 * Drift corrections are not errors; see recording::sync::SyncAdjustment.
 *
 * ============================================================================
 */

use serde::Serialize;
use std::fmt;

// Structured failure returned by the media-encoder boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderError {
    // Exit status of the encoder process, None if it never ran or was killed
    pub status: Option<i32>,

    // Full diagnostic output (stderr) of the encoder
    pub diagnostics: String,
}

impl EncoderError {
    pub fn new(status: Option<i32>, diagnostics: impl Into<String>) -> Self {
        Self {
            status,
            diagnostics: diagnostics.into(),
        }
    }
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "encoder exited with status {}: {}", code, self.diagnostics),
            None => write!(f, "encoder failed: {}", self.diagnostics),
        }
    }
}

impl std::error::Error for EncoderError {}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Audio device {0} is already in use")]
    DeviceBusy(usize),

    #[error("Encoding error (status {status:?}): {diagnostics}")]
    Encoding {
        status: Option<i32>,
        diagnostics: String,
    },

    #[error("State error: {0}")]
    State(String),

    #[error("Session captured no video frames")]
    EmptySession,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecorderError {
    pub fn is_device(&self) -> bool {
        matches!(self, RecorderError::Device(_) | RecorderError::DeviceBusy(_))
    }
}

impl From<EncoderError> for RecorderError {
    fn from(e: EncoderError) -> Self {
        RecorderError::Encoding {
            status: e.status,
            diagnostics: e.diagnostics,
        }
    }
}

// Allow serializing errors for a UI layer
impl Serialize for RecorderError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_error_converts_with_diagnostics() {
        let err: RecorderError = EncoderError::new(Some(1), "Unknown encoder 'libx264'").into();
        match err {
            RecorderError::Encoding { status, diagnostics } => {
                assert_eq!(status, Some(1));
                assert!(diagnostics.contains("libx264"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_serializes_as_string() {
        let err = RecorderError::State("Already recording".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"State error: Already recording\"");
    }

    #[test]
    fn test_device_classification() {
        assert!(RecorderError::Device("gone".into()).is_device());
        assert!(RecorderError::DeviceBusy(0).is_device());
        assert!(!RecorderError::EmptySession.is_device());
    }
}
