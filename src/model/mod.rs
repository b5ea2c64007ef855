mod registry;
pub mod resolver;
mod types;

pub use registry::ProviderRegistry;
pub use types::{
    ContextMode, DocumentQuestion, FinishReason, GenerationRequest, GenerationResult,
    HealthState, HealthStatus, ModelInfo,
};
