use std::sync::Arc;

use tracing::info;

use crate::backend::LlmProvider;

#[derive(Clone)]
pub struct ProviderRegistry {
    default: Arc<dyn LlmProvider>,
}

impl ProviderRegistry {
    pub fn new(default: Arc<dyn LlmProvider>) -> Self {
        Self { default }
    }

    pub fn default_provider(&self) -> &Arc<dyn LlmProvider> {
        &self.default
    }

    pub fn resolve(&self, requested_model: Option<&str>) -> Arc<dyn LlmProvider> {
        match requested_model {
            Some(model) if model != self.default.model_name() => {
                info!(from = self.default.model_name(), to = model, "switching model for request");
                self.default.with_model(model)
            }
            _ => self.default.clone(),
        }
    }
}
