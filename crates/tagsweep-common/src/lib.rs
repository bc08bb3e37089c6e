//! tagsweep-common - Provider-free types for the tagsweep garbage collector
//!
//! Nothing in this crate talks to a cloud API, which keeps the eligibility
//! rules and tag handling testable in isolation.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`eligibility`]: Staleness predicate over a resource's tags
//! - [`name_filter`]: Resource-name narrowing applied before tag lookups
//! - [`resource_kind`]: The resource types a sweep can discover
//! - [`tags`]: Normalized tag map and tag-key defaults

pub mod defaults;
pub mod eligibility;
pub mod name_filter;
pub mod resource_kind;
pub mod tags;

pub use eligibility::{
    EligibilityConfig, EligibilityError, Verdict, evaluate, is_stale, min_age_from_hours,
};
pub use name_filter::NameFilter;
pub use resource_kind::ResourceKind;
pub use tags::TagSet;
