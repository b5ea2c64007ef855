pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod generation;
pub mod model;
pub mod relay;
pub mod server;

pub use backend::{LlmProvider, OllamaClient, build_provider};
pub use config::AppConfig;
pub use document::{DocumentExtractor, DocumentService, PdfExtractor};
pub use error::{ModelNotFound, ServiceError};
pub use generation::{GenerationService, StreamEvent};
pub use model::{GenerationRequest, GenerationResult, ProviderRegistry};
pub use server::build_router;
