//! Artifact discovery, filtering and transfer
//!
//! - [`discovery`]: list files under a remote root with retry
//! - [`filter`]: regular-expression selection of discovered paths
//! - [`transfer`]: rsync/scp copy behind the [`FileTransfer`] trait
//! - [`sources`]: source path validation and pattern list helpers

pub mod discovery;
pub mod filter;
pub mod sources;
pub mod transfer;

pub use discovery::{Discovery, ListingStrategy, SINCE_START_GRACE, discover, listing_strategies};
pub use filter::PatternFilter;
pub use transfer::{FileTransfer, PullRequest, RsyncTransfer};
