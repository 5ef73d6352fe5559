//! Microsoft Azure provider for vmexport
//!
//! Exports Azure VMs as one VHD per managed disk.
//!
//! # Export flow
//!
//! 1. Deallocate and generalize the VM (each can be disabled)
//! 2. For every disk, in attachment order:
//!    grant a read SAS, optionally copy it into a blob container,
//!    download it through the transfer layer, revoke the SAS
//! 3. Write `{vm}-manifest.json` and `{vm}-metadata.json`
//!
//! # Requirements
//!
//! - `az` CLI must be installed
//! - Either an existing `az login` session or service principal credentials
//!   (`client_id`, `client_secret`, `tenant_id`)
//!
//! # Example
//!
//! ```ignore
//! use vmexport_azure::AzureProvider;
//! use vmexport_core::{CancelToken, ExportOptions, Provider, ProviderConfig, ProviderType};
//!
//! let mut provider = AzureProvider::new();
//! let config = ProviderConfig::new(ProviderType::Azure)
//!     .with_metadata("subscription_id", "0000".into())
//!     .with_metadata("resource_group", "rg-prod".into());
//! provider.connect(&config).await?;
//!
//! let results = provider
//!     .export_vm("web-01", &ExportOptions::new("/exports"), &CancelToken::new())
//!     .await?;
//! ```

pub mod api;
pub mod az;
pub mod error;
pub mod export;
pub mod options;
pub mod provider;

#[cfg(test)]
mod mock;

pub use api::{AzDisk, AzVm, AzureApi, BlobCopyState};
pub use az::AzCli;
pub use error::{AzureError, Result};
pub use options::{AzureConfig, AzureExportOptions, AzureFormat};
pub use provider::AzureProvider;
