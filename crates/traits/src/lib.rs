//! ktrait traits: the trait contract, the catalog that runs traits in
//! dependency order, and the built-in traits.

#![forbid(unsafe_code)]

use std::fmt;

use ktrait_core::{ClusterType, Result, RuntimeType, TraitProfile};
use ktrait_expr::Traits;
use ktrait_registry::TraitContext;
use serde::Serialize;

pub mod builtin;
pub mod catalog;
pub mod mount;

pub use catalog::{RunReport, SkipReason, TraitCatalog};
pub use mount::{ContentKind, MountResource, StorageKind};

/// Things a trait contributes to the registry, used to order traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Workload,
    Container,
    Service,
    Ingress,
    Route,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::Workload => "workload",
            Artifact::Container => "container",
            Artifact::Service => "service",
            Artifact::Ingress => "ingress",
            Artifact::Route => "route",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A transformation unit. Traits are stateless: everything they decide on
/// comes from the trait configuration and the context.
#[allow(unused_variables)]
pub trait Trait: Send + Sync {
    fn name(&self) -> &'static str;

    /// Position in the run; lower runs first.
    fn order(&self) -> i32;

    fn produces(&self) -> &'static [Artifact] { &[] }
    fn requires(&self) -> &'static [Artifact] { &[] }

    fn accept_profile(&self, profile: Option<TraitProfile>) -> bool { true }
    fn accept_cluster(&self, cluster: Option<ClusterType>) -> bool { true }

    /// Decide whether the trait runs. Invalid configuration is an error;
    /// missing prerequisites return `Ok(false)`.
    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool>;

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()>;

    /// Runtime specific follow-up, run right after `apply`.
    fn apply_runtime_specific(&self, traits: &Traits, ctx: &mut TraitContext, runtime: RuntimeType) -> Result<()> {
        Ok(())
    }
}
