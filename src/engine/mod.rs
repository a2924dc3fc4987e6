//! Terminal side of the reconcile engine
//!
//! 1. Displaying - Render the change list and the final summary
//! 2. Interacting - Progress and confirmation adapters for the reconciler

pub mod differ;
pub mod executor;

pub use executor::{DialogConfirm, TerminalProgress, print_summary};
