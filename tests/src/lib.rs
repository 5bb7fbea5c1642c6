//! # Stratos Test Suite
//!
//! Cross-subsystem tests that need more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs     # Shared cluster documents and journal helpers
//!     ├── properties.rs   # Idempotence, ordering, cycles, resumption, tags
//!     └── runtime_flow.rs # Runtime + state store across runs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p st-tests
//! cargo test -p st-tests integration::properties
//!
//! # Benchmarks
//! cargo bench -p st-tests
//! ```

#![allow(dead_code)]

pub mod integration;
