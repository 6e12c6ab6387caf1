//! # docrel Testkit
//!
//! Test utilities for docrel.
//!
//! This crate provides:
//! - A committed sample snapshot and the merge scenarios run against it
//! - Managers wired to an in-memory backend
//! - Property-based test generators using proptest
//! - Stress testing utilities for concurrent shared writers
//!
//! ## Usage
//!
//! ```rust
//! use docrel_testkit::prelude::*;
//!
//! for scenario in Scenario::ALL {
//!     let outcome = scenario.run();
//!     assert_eq!(outcome.is_ok(), scenario.expected_rule().is_none());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::scenarios::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
