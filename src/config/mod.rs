pub mod defaults;
mod settings;

pub use settings::{mb_to_bytes, EngineSettings, OversizePolicy, Settings};
