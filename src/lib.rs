//! Codeforge Gateway Library
//!
//! Request gateway in front of a code-generation backend: token
//! registration, per-token quota, hot-reloaded configuration, admission
//! control and the request pipeline that ties them together.

pub mod admission;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod metrics_server;
pub mod pipeline;
pub mod registry;
pub mod response;
pub mod server;
pub mod text;

pub use admission::{AdmissionController, GenerationRequest};
pub use backend::{BackendError, BackendOutput, GenerationBackend, GenerationParams, HttpBackend};
pub use config::{Config, ConfigStore, RefreshOutcome};
pub use error::GatewayError;
pub use pipeline::RequestPipeline;
pub use registry::{TokenRegistry, TokenStore};
pub use response::{GenerationResponse, RegistrationResponse};
pub use text::{BlockFormatter, TextProcessor};
