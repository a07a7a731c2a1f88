//! Boundary to the voice connection and the transcoder that streams audio
//! into it. Sessions only talk to these traits.

pub mod clock;
pub mod output;

pub use clock::{ClockVoice, OutputCall};
pub use output::{AudioError, AudioOutput, OutputEvent, OutputEvents, PlayId, StartRequest, VoiceLink};
