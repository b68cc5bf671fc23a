pub mod illustration;
pub mod images;
pub mod llm;
pub mod outline;
pub mod presets;
pub mod prompt;
pub mod render;
pub mod setup;
pub mod workflow;
