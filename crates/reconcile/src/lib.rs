//! # Reconcile
//!
//! Declarative state reconciliation for an asset-management backend.
//!
//! A user describes the desired state of a container (zones, labels,
//! assets and their collectors) in a JSON or YAML document. This crate
//! fetches the current state, validates the document, computes an ordered
//! list of changes and executes them one at a time.
//!
//! ## Core Concepts
//!
//! - **State**: A container with its zones, labels and assets
//! - **Change**: One remote mutation with a human-readable description
//! - **Backend**: The remote API, behind a trait so tests run in memory
//! - **Reconciler**: The full read, validate, diff, confirm, execute workflow
//!
//! ## Example
//!
//! ```
//! use reconcile::backend::mock::MockBackend;
//! use reconcile::{ApplyOptions, AutoConfirm, NoProgress, Outcome, Reconciler, State};
//! use reconcile::model::DocumentFormat;
//! use std::path::Path;
//!
//! let doc = "container: {id: 42}\nzones: [{zone: 3, name: DMZ}]\n";
//! let mut target = State::parse(doc, DocumentFormat::Yaml, Path::new("doc.yaml")).unwrap();
//!
//! let backend = MockBackend::new(42);
//! let options = ApplyOptions { use_cache: false, ..Default::default() };
//! let outcome = Reconciler::new(&backend, options)
//!     .apply(&mut target, &mut AutoConfirm, &mut NoProgress)
//!     .unwrap();
//! assert!(matches!(outcome, Outcome::Applied { .. }));
//! assert_eq!(backend.zones()[0].name, "DMZ");
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives phase messages and per-change progress
//! - [`ConfirmCallback`]: Answers yes/no prompts
//!
//! The crate has no terminal code of its own.

pub mod backend;
pub mod cache;
pub mod change;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod labels;
pub mod model;
pub mod reconciler;
pub mod schema;
pub mod snapshot;
pub mod validate;
pub mod value;

// Re-export main types at crate root
pub use backend::Backend;
pub use backend::http::HttpBackend;
pub use cache::StateCache;
pub use change::{Change, ChangeKind, Operation};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::diff;
pub use error::{Error, ErrorCategory, Result};
pub use executor::{ExecuteSummary, execute};
pub use labels::LabelMap;
pub use model::{Asset, Container, Label, State, Zone};
pub use reconciler::{ApplyOptions, Outcome, Reconciler};
pub use snapshot::fetch_current_state;
