//! Feed import pipeline.
//!
//! The pipeline is staged per agency:
//!
//! 1. [`reader`] streams each feed file from disk in fixed-size batches,
//!    deserializing rows into the typed records of [`records`].
//! 2. [`importer`] consumes batches in dependency order, rewriting feed
//!    natural keys to generated surrogate keys through [`refs`], and bulk
//!    inserts each batch inside one transaction per agency.
//! 3. [`queue`] runs agencies one after another and collects per-agency
//!    outcomes.
//!
//! The unit of atomicity is the agency generation: an import either fully
//! replaces the previous generation or leaves it untouched.

pub mod batch;
pub mod importer;
pub mod queue;
pub mod reader;
pub mod records;
pub mod refs;
pub mod shapes;

pub use importer::{FeedImporter, ImportStats};
pub use queue::{AgencyFeed, AgencyOutcome, ImportQueue};
pub use reader::{FeedDirectory, FeedFile};
