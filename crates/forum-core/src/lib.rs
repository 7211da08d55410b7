//! forum/crates/forum-core/src/lib.rs
//!
//! The engagement logic and interface definitions for the forum: who is
//! acting, how reactions are reconciled, and how comment threads are built.

pub mod accounts;
pub mod error;
pub mod models;
pub mod reaction;
pub mod thread;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use accounts::AccountService;
pub use error::*;
pub use models::*;
pub use reaction::ReactionReconciler;
pub use thread::{build_forest, ThreadAssembler};
pub use traits::*;
