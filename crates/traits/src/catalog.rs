//! Trait catalog: registration, dependency ordering and the run loop.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use ktrait_core::{Result, TraitError, TraitProfile};
use ktrait_expr::Traits;
use ktrait_registry::TraitContext;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{builtin, Artifact, Trait};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Profile,
    Cluster,
    NotConfigured,
}

/// Outcome of one catalog run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<(&'static str, SkipReason)>,
    pub addons: Vec<String>,
}

/// Registered traits in execution order.
pub struct TraitCatalog {
    traits: Vec<Box<dyn Trait>>,
}

impl TraitCatalog {
    /// Catalog of the built-in traits.
    pub fn new() -> Result<Self> { Self::with_traits(builtin::all()) }

    /// Order `traits` so every trait runs after the producers of what it
    /// requires. Among traits that are ready, the lower `(order, registration
    /// index)` goes first, which is plain ascending order when declared
    /// orders agree with the dependencies.
    pub fn with_traits(traits: Vec<Box<dyn Trait>>) -> Result<Self> {
        let n = traits.len();
        let mut producers: HashMap<Artifact, Vec<usize>> = HashMap::new();
        for (i, t) in traits.iter().enumerate() {
            for a in t.produces() {
                producers.entry(*a).or_default().push(i);
            }
        }

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for (i, t) in traits.iter().enumerate() {
            for a in t.requires() {
                let Some(ps) = producers.get(a) else {
                    return Err(TraitError::Catalog(format!("trait `{}` requires {} but no trait produces it", t.name(), a)));
                };
                for &p in ps.iter().filter(|&&p| p != i) {
                    if traits[p].order() > t.order() {
                        warn!(
                            producer = traits[p].name(),
                            producer_order = traits[p].order(),
                            consumer = t.name(),
                            consumer_order = t.order(),
                            artifact = a.as_str(),
                            "catalog: declared order contradicts dependency; dependency wins"
                        );
                    }
                    successors[p].push(i);
                    indegree[i] += 1;
                }
            }
        }

        let mut ready: BTreeSet<(i32, usize)> =
            (0..n).filter(|&i| indegree[i] == 0).map(|i| (traits[i].order(), i)).collect();
        let mut sequence = Vec::with_capacity(n);
        while let Some((_, i)) = ready.pop_first() {
            sequence.push(i);
            for &s in &successors[i] {
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    ready.insert((traits[s].order(), s));
                }
            }
        }
        if sequence.len() < n {
            let stuck: Vec<&str> = (0..n).filter(|&i| indegree[i] > 0).map(|i| traits[i].name()).collect();
            return Err(TraitError::Catalog(format!("dependency cycle between traits: {}", stuck.join(", "))));
        }

        let mut slots: Vec<Option<Box<dyn Trait>>> = traits.into_iter().map(Some).collect();
        let traits = sequence.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(Self { traits })
    }

    pub fn traits(&self) -> impl Iterator<Item = &dyn Trait> + '_ { self.traits.iter().map(|t| t.as_ref()) }

    pub fn get(&self, name: &str) -> Option<&dyn Trait> { self.traits().find(|t| t.name() == name) }

    /// Traits eligible under `profile`, in execution order.
    pub fn traits_for_profile(&self, profile: Option<TraitProfile>) -> Vec<&dyn Trait> {
        self.traits().filter(|t| t.accept_profile(profile)).collect()
    }

    /// Run every trait once against `ctx`. The first error aborts the run.
    pub fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<RunReport> {
        let t0 = Instant::now();
        let profile = ctx.profile();
        let cluster = ctx.cluster_type();
        let runtime = ctx.runtime();

        let mut report = RunReport::default();
        for t in self.traits() {
            if !t.accept_profile(profile) {
                debug!(name = t.name(), "catalog: trait not eligible for profile");
                counter!("trait_skipped_total", 1u64, "reason" => "profile");
                report.skipped.push((t.name(), SkipReason::Profile));
                continue;
            }
            if !t.accept_cluster(cluster) {
                debug!(name = t.name(), "catalog: trait not eligible for cluster type");
                counter!("trait_skipped_total", 1u64, "reason" => "cluster");
                report.skipped.push((t.name(), SkipReason::Cluster));
                continue;
            }
            counter!("trait_configured_total", 1u64, "trait" => t.name());
            if !t.configure(traits, ctx)? {
                debug!(name = t.name(), order = t.order(), "catalog: trait skipped");
                counter!("trait_skipped_total", 1u64, "reason" => "configure");
                report.skipped.push((t.name(), SkipReason::NotConfigured));
                continue;
            }
            debug!(name = t.name(), order = t.order(), "catalog: applying trait");
            t.apply(traits, ctx)?;
            t.apply_runtime_specific(traits, ctx, runtime)?;
            counter!("trait_applied_total", 1u64, "trait" => t.name());
            report.applied.push(t.name());
        }

        for (name, options) in &traits.addons {
            info!(addon = %name, options = options.len(), "catalog: no handler for trait; options kept as addon");
            report.addons.push(name.clone());
        }
        let took_ms = t0.elapsed().as_secs_f64() * 1000.0;
        histogram!("catalog_apply_ms", took_ms);
        info!(applied = report.applied.len(), skipped = report.skipped.len(), resources = ctx.len(), took_ms, "catalog: run ok");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        order: i32,
        produces: &'static [Artifact],
        requires: &'static [Artifact],
    }

    impl Trait for Stub {
        fn name(&self) -> &'static str { self.name }
        fn order(&self) -> i32 { self.order }
        fn produces(&self) -> &'static [Artifact] { self.produces }
        fn requires(&self) -> &'static [Artifact] { self.requires }
        fn configure(&self, _: &Traits, _: &TraitContext) -> Result<bool> { Ok(true) }
        fn apply(&self, _: &Traits, _: &mut TraitContext) -> Result<()> { Ok(()) }
    }

    fn stub(name: &'static str, order: i32, produces: &'static [Artifact], requires: &'static [Artifact]) -> Box<dyn Trait> {
        Box::new(Stub { name, order, produces, requires })
    }

    fn names(c: &TraitCatalog) -> Vec<&'static str> { c.traits().map(|t| t.name()).collect() }

    #[test]
    fn equal_orders_keep_registration_order() {
        let c = TraitCatalog::with_traits(vec![
            stub("b", 10, &[], &[]),
            stub("a", 10, &[], &[]),
            stub("first", 1, &[], &[]),
        ])
        .unwrap();
        assert_eq!(names(&c), vec!["first", "b", "a"]);
    }

    #[test]
    fn dependencies_override_declared_order() {
        let c = TraitCatalog::with_traits(vec![
            stub("service", 5, &[Artifact::Service], &[Artifact::Container]),
            stub("container", 50, &[Artifact::Container], &[]),
        ])
        .unwrap();
        assert_eq!(names(&c), vec!["container", "service"]);
    }

    #[test]
    fn missing_producer_is_rejected() {
        let err = TraitCatalog::with_traits(vec![stub("ingress", 1, &[], &[Artifact::Service])]).err().unwrap();
        assert!(err.to_string().contains("requires service"), "{err}");
    }

    #[test]
    fn cycles_are_rejected() {
        let err = TraitCatalog::with_traits(vec![
            stub("a", 1, &[Artifact::Service], &[Artifact::Route]),
            stub("b", 2, &[Artifact::Route], &[Artifact::Service]),
        ])
        .err()
        .unwrap();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    struct KnativeOnly;

    impl Trait for KnativeOnly {
        fn name(&self) -> &'static str { "knative-only" }
        fn order(&self) -> i32 { 1 }
        fn accept_profile(&self, profile: Option<TraitProfile>) -> bool { profile == Some(TraitProfile::Knative) }
        fn configure(&self, _: &Traits, _: &TraitContext) -> Result<bool> { Ok(true) }
        fn apply(&self, _: &Traits, _: &mut TraitContext) -> Result<()> { Ok(()) }
    }

    #[test]
    fn profile_gate_applies_without_a_profile() {
        let c = TraitCatalog::with_traits(vec![Box::new(KnativeOnly), stub("any", 2, &[], &[])]).unwrap();
        let traits = Traits::default();

        let report = c.apply(&traits, &mut TraitContext::new("x", "1")).unwrap();
        assert_eq!(report.skipped, vec![("knative-only", SkipReason::Profile)]);
        assert_eq!(report.applied, vec!["any"]);

        let mut knative = TraitContext::new("x", "1").with_profile(Some(TraitProfile::Knative));
        assert_eq!(c.apply(&traits, &mut knative).unwrap().applied, vec!["knative-only", "any"]);
        assert_eq!(c.traits_for_profile(None).len(), 1);
    }
}
