pub mod audio;
pub mod health;
pub mod tts;
pub mod voice;
