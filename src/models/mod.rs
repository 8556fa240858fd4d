pub mod item;
pub mod job;
pub mod loaders;
pub mod request;

pub use item::{BatchItem, ItemKind, ItemResult, ItemStatus, SourceInfo};
pub use job::{BatchJob, BatchOptions, JobStatus};
pub use loaders::{load_toml_to_request, parse_request};
pub use request::{CitationStyle, ItemSpec, Operation, RequestOptions, SubmitRequest, SubmitResponse};
