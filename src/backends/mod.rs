/// Built-in speech-to-text backends.
pub mod whisper;
