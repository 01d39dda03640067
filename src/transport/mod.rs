mod process;
mod staging;

pub use process::{GeneratorProcess, ProcessLauncher};
pub use staging::{PromptStager, StagedPrompt};
