pub mod error;
pub mod recording;

pub use error::{EncoderError, RecorderError, Result};
pub use recording::config::RecorderConfig;
pub use recording::manager::{CaptureSources, Recorder, StopHandle};
pub use recording::types::{
    OutputFormat, Rect, RecordingStatus, SessionPhase, SessionReport, SessionRequest,
};
