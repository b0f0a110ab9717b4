//! Registry-backed prediction UDF.
//!
//! A model name resolves to its production version in the registry; the
//! signature and pipeline bundle are downloaded once and cached, and every
//! later call scores a single row against the cached pipeline.

pub mod bundle;
pub mod cache;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod server;
pub mod signature;
pub mod udf;

pub use bundle::{BundleError, BundleLoader, BundlePipeline};
pub use cache::ModelCache;
pub use pipeline::{LeapFrame, Pipeline, PipelineLoader, TransformError};
pub use registry::{MlflowRegistry, ModelRegistry, RegistryError};
pub use resolver::{ModelRecord, ModelResolver, ResolutionError, ResolveError};
pub use schema::{BindError, Field, FieldType, Param, Schema, Value};
pub use signature::ModelSignature;
pub use udf::{PredictError, PredictUdf};
