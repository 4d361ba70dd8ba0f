//! # SnapVault Testkit
//!
//! Test utilities for SnapVault.
//!
//! This crate provides:
//! - A family-tracking catalog and populated store fixtures
//! - Property-based generators for acyclic catalogs
//! - A builder for handcrafted (and hostile) archives
//! - A backup-then-restore harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snapvault_testkit::prelude::*;
//!
//! #[test]
//! fn restores_family() {
//!     let harness = BackupHarness::family();
//!     harness.round_trip().unwrap();
//!     harness.assert_equivalent();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archives;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::archives::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use archives::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
