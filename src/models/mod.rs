pub mod config;
pub mod job;
pub mod record;

pub use config::GatewayConfig;
pub use job::{JobKind, RetrievalJob};
pub use record::{ArchiveRecord, IndexDoc};
