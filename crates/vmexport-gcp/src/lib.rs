//! Google Cloud Platform provider for vmexport
//!
//! Exports Compute Engine instances disk by disk: each persistent disk is
//! turned into an image, the image is exported to Cloud Storage as VMDK (or a
//! raw tarball) and the object is downloaded through the transfer layer.
//!
//! # Requirements
//!
//! - `gcloud` CLI installed, with the Cloud Build API enabled for image export
//! - An active gcloud account, or `credentials_json` pointing at a service
//!   account key file
//! - A GCS bucket (`gcs_bucket`) the export can write to

pub mod api;
pub mod error;
pub mod export;
pub mod gcloud;
pub mod options;
pub mod provider;

#[cfg(test)]
mod mock;

pub use api::{GceDisk, GceInstance, GcpApi};
pub use error::{GcpError, Result};
pub use gcloud::Gcloud;
pub use options::{GcpConfig, GcpExportOptions, GcpFormat};
pub use provider::GcpProvider;
