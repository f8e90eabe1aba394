//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestInbox, seed_window};
//!
//! #[tokio::test]
//! async fn test_seeded_inbox() {
//!     let inbox = TestInbox::with_backend(seed_window());
//!     assert_eq!(inbox.engine.cache().len(), 20);
//! }
//! ```

mod constants;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
pub use fixtures::{bumped_record, ids, record, seed_window, TestInbox};
