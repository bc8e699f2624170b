//! Testing infrastructure.
//!
//! Traits abstract the optional enrichment signals (version control,
//! test runner); mocks implement them with controllable behavior;
//! fixtures build seeded temporary stores (test builds only).

#[cfg(test)]
pub mod fixtures;
pub mod mocks;
pub mod traits;

#[cfg(test)]
pub use fixtures::StoreFixture;
pub use mocks::{MockTestProbe, MockVcs};
pub use traits::{TestProbe, VcsOperations};
