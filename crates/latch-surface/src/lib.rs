//! Declaration surface and read-only introspection for `latch-kernel`.
//!
//! The kernel only knows specs and registries. This crate is what a host
//! program writes type definitions against:
//!
//! - [`VisibilityTracker`]: the current declared visibility of a body
//! - [`TypeBody`] / [`AttributeDecl`]: attribute declaration builders
//! - [`DefineWith`]: all-or-nothing `define_*_with` helpers on [`Host`]
//! - [`introspect`]: JSON descriptions and registry fingerprints
//!
//! [`Host`]: latch_kernel::Host

pub mod body;
pub mod introspect;
pub mod visibility;

pub use body::{AttributeDecl, DefineWith, TypeBody};
pub use introspect::{describe, describe_owner, registry_fingerprint, OwnerView};
pub use visibility::VisibilityTracker;
