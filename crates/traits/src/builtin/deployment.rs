use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use ktrait_core::Result;
use ktrait_expr::{Traits, DEPLOYMENT};
use ktrait_registry::{Resource, TraitContext};

use super::{cronjob, knative_service, one_of, pod_template, ORDER_WORKLOAD};
use crate::{Artifact, Trait};

/// Default workload: a Deployment, unless another workload trait is active.
pub struct DeploymentTraitHandler;

impl Trait for DeploymentTraitHandler {
    fn name(&self) -> &'static str { DEPLOYMENT }
    fn order(&self) -> i32 { ORDER_WORKLOAD }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Workload] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let spec = traits.deployment.clone().unwrap_or_default();
        if spec.enabled == Some(false) {
            return Ok(false);
        }
        if let Some(strategy) = spec.strategy.as_deref() {
            one_of(DEPLOYMENT, "strategy", strategy, &["RollingUpdate", "Recreate"])?;
        }
        if cronjob::active(traits) || knative_service::active(traits, ctx.profile()) {
            return Ok(false);
        }
        Ok(!ctx.has_workload())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.deployment.clone().unwrap_or_default();
        let deployment = Deployment {
            metadata: ctx.object_meta(),
            spec: Some(DeploymentSpec {
                replicas: spec.replicas,
                progress_deadline_seconds: spec.progress_deadline_seconds,
                strategy: spec.strategy.map(|s| DeploymentStrategy { type_: Some(s), ..Default::default() }),
                selector: LabelSelector { match_labels: Some(ctx.selector_labels()), ..Default::default() },
                template: pod_template(ctx),
                ..Default::default()
            }),
            ..Default::default()
        };
        ctx.add(Resource::Deployment(deployment))
    }
}
