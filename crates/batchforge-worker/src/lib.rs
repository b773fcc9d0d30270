//! Worker process runtime: owns one row range end to end — load, batch
//! through the model, validate, checkpoint, merge, report status.

pub mod errors;
pub mod model_client_http;
pub mod processor;
pub mod row;
pub mod serializer;
pub mod validation;
pub mod worker;

pub use errors::{ProcessorError, SerializerError, WorkerError};
pub use model_client_http::{HttpModelClient, HttpModelClientConfig};
pub use processor::{PromptsConfig, Processor, ProgressUpdate};
pub use row::{get_str, read_csv, read_csv_from_path, row_id, rows_to_csv_bytes, RowRecord};
pub use serializer::Serializer;
pub use validation::{CategoricalRule, RelationshipConstraint, RelationshipRule};
pub use worker::{Worker, WorkerArgs};
