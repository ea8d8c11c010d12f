//! Resources managed by the installer
//!
//! Every cloud resource is a [`CloudResource`]: a declaration plus the
//! provider that converges it, exposed to the engine through the
//! declarative [`Resource`] trait.

pub mod cloud;

pub use cloud::CloudResource;
pub use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
