mod request_id;

use crate::config::AppConfig;
use crate::transport::{ProcessLauncher, PromptStager};

use request_id::RequestIdGenerator;

/// Identity assigned to one chat completion request.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub seq: u64,
    pub completion_id: String,
    pub prompt_token: uuid::Uuid,
}

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub stager: PromptStager,
    pub launcher: ProcessLauncher,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let stager = PromptStager::new(config.generator.scratch_dir.clone());
        let launcher = ProcessLauncher::from_config(&config.generator);
        Self {
            config,
            stager,
            launcher,
            request_ids: RequestIdGenerator::new(),
        }
    }

    pub fn next_request(&self) -> RequestIdentity {
        let seq = self.request_ids.next_seq();
        RequestIdentity {
            seq,
            completion_id: RequestIdGenerator::completion_id(seq),
            prompt_token: self.request_ids.prompt_token(seq),
        }
    }
}
