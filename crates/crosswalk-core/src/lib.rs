//! # crosswalk-core
//!
//! Shared domain model for the crosswalk control-mapping service.
//!
//! This crate provides:
//!
//! - **Composite keys**: Validated framework, control, and mapping keys
//! - **Job model**: The client-visible mapping job and its state machine
//! - **Store traits**: Conditional-write job store, catalog, and caches
//! - **Observability**: Logging initialization and span constructors
//!
//! ## Core Concepts
//!
//! - **Control**: A single compliance requirement within a framework
//! - **Framework**: A named, versioned set of controls
//! - **Job**: One asynchronous mapping request, identified by a UUID and
//!   driven through `PENDING → RUNNING → {COMPLETED, FAILED}`
//! - **Candidate**: A scored target control returned on a completed job
//!
//! ## Guarantees
//!
//! - **Monotonic status**: Job transitions never move backward
//! - **At-most-one terminal write**: Conditional store writes absorb
//!   duplicate completion attempts from redelivered queue messages
//!
//! ## Example
//!
//! ```rust
//! use crosswalk_core::keys::{ControlKey, FrameworkKey, MappingKey};
//!
//! # fn main() -> crosswalk_core::error::Result<()> {
//! let framework = FrameworkKey::parse("NIST-SP-800-53#R5")?;
//! let control = ControlKey::build(&framework, "AC-1")?;
//! let other = ControlKey::parse("AWS.EC2#1.0#PR.1")?;
//!
//! // Mapping keys are commutative: the unordered pair has one canonical key.
//! assert_eq!(
//!     MappingKey::build(&control, &other),
//!     MappingKey::build(&other, &control),
//! );
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod job;
pub mod keys;
pub mod observability;
pub mod store;

pub use error::{Error, Result};
pub use job::{Candidate, Job, JobStatus};
pub use keys::{ControlKey, FrameworkKey, MappingKey};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{Control, ControlCatalog, Framework};
    pub use crate::error::{Error, Result};
    pub use crate::job::{Candidate, Job, JobStatus};
    pub use crate::keys::{ControlKey, FrameworkKey, MappingKey};
    pub use crate::store::memory::{
        InMemoryCatalog, InMemoryEmbeddingCache, InMemoryEnrichmentCache, InMemoryJobStore,
    };
    pub use crate::store::{
        EmbeddingCache, EmbeddingEntry, EnrichmentCache, EnrichmentEntry, JobStore,
        TransitionOutcome,
    };
}
