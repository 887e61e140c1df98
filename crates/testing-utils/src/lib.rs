//! # Explore Testing Utils
//!
//! Shared testing utilities for the explore workspace: test data builders,
//! scripted collaborators with failure injection, and a [`TestWorld`] that
//! wires every in-memory store together.
//!
//! ```toml
//! [dev-dependencies]
//! explore-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
