//! vmexport core
//!
//! Provider abstraction and the shared export machinery used by every cloud
//! backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  vmexport CLI                    │
//! │         (providers / list / show / export)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 vmexport-core                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Provider  +  ProviderRegistry      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │ DiskOutcomes │  │ Transfer (progress,  │    │
//! │  │   Manifest   │  │ checkpoint, throttle)│    │
//! │  └──────────────┘  └──────────────────────┘    │
//! └───────┬─────────────────┬─────────────┬─────────┘
//!         │                 │             │
//! ┌───────▼──────┐ ┌────────▼─────┐ ┌─────▼────────┐
//! │    azure     │ │     gcp      │ │     aws      │
//! │ (az CLI+SAS) │ │(gcloud+GCS)  │ │ (aws CLI+S3) │
//! └──────────────┘ └──────────────┘ └──────────────┘
//! ```

pub mod cancel;
pub mod cli;
pub mod cost;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod options;
pub mod outcome;
pub mod provider;
pub mod registry;
pub mod transfer;
pub mod wait;

// Re-exports
pub use cancel::CancelToken;
pub use cli::CliRunner;
pub use cost::{CostEstimator, CostQuery};
pub use error::{ExportError, Result, TransferError};
pub use manifest::{
    ExportManifest, VmMetadataRecord, create_export_manifest, load_export_manifest,
    write_export_artifacts, write_vm_metadata,
};
pub use metadata::{Metadata, MetadataExt};
pub use options::ExportOptions;
pub use outcome::{DiskLabels, DiskOutcomes, export_disks};
pub use provider::{
    ExportCapabilities, ExportResult, Provider, ProviderConfig, ProviderType, VmFilter, VmInfo,
};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use transfer::{
    ByteSource, FileInfo, HttpSource, ProgressCallback, ProgressReporter, ProgressSink,
    ProgressUpdate, Transfer, TransferOptions,
};
pub use wait::{Poll, PollConfig, poll_until};
