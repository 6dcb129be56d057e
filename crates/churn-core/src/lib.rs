pub mod artifact;
pub mod config;
pub mod encoding;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod schema;
pub mod service;
pub mod train;
pub mod util;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use artifact::ModelArtifactBundle;
pub use error::{ChurnError, ChurnResult};
pub use service::{InferenceService, ModelState};
