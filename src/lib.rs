pub mod config;
pub mod graph;
pub mod model;
pub mod observability;
pub mod report;
pub mod response;
#[cfg(feature = "server")]
pub mod server;
pub mod validation;

pub use model::{Edge, Node, Pipeline};
pub use response::{ParseResponse, parse_pipeline};
pub use validation::{PipelineReport, PipelineValidator, ValidationError};
