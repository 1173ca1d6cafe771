//! Storage abstractions for weather-ipfs services.
//!
//! Provides:
//! - The [`ContentStore`] boundary over an IPFS node (content + MFS + IPNS)
//! - An HTTP implementation against the IPFS RPC API
//! - The MFS layout used for telemetry records
//! - The background queue that republishes the MFS root under IPNS

pub mod ipfs;
pub mod paths;
pub mod queue;
pub mod store;

pub use ipfs::{IpfsClient, IpfsConfig};
pub use paths::{record_file_name, NamespacePath, DEFAULT_ROOT, LATEST_FILE};
pub use queue::{PublishJob, PublishQueue, PublishQueueConfig, QueueStats, SubmitOutcome};
pub use store::{ContentStore, PublishOptions, PublishedName, StoreError, StoreResult};
