//! Shared test utilities for tagsweep
//!
//! ## Modules
//!
//! - [`fake`]: In-memory `CloudApi` with failure injection and call recording
//! - [`fixtures`]: Tag sets, configs and AWS test helpers

pub mod fake;
pub mod fixtures;

pub use fake::{Call, FakeCloud, FakeVpc};
pub use fixtures::{
    fast_waits, foreign_tags, fresh_tags, get_test_region, named, stale_tags, test_config,
    test_run_id,
};
