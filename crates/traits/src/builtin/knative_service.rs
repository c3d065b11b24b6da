use std::collections::BTreeMap;

use ktrait_core::{Result, TraitError, TraitProfile};
use ktrait_expr::{Traits, KNATIVE_SERVICE};
use ktrait_registry::{KnativeService, Resource, TraitContext};

use super::{one_of, pod_template, ORDER_WORKLOAD};
use crate::{Artifact, Trait};

const AUTOSCALING: &str = "autoscaling.knative.dev";
const VISIBILITY_LABEL: &str = "networking.knative.dev/visibility";
const BINDINGS_LABEL: &str = "bindings.knative.dev/include";
const ROLLOUT_DURATION: &str = "serving.knative.dev/rolloutDuration";

fn profile_allowed(profile: Option<TraitProfile>) -> bool {
    matches!(profile, None | Some(TraitProfile::Knative))
}

/// Knative replaces the Deployment when enabled, or by default under the
/// knative profile.
pub(crate) fn active(traits: &Traits, profile: Option<TraitProfile>) -> bool {
    if !profile_allowed(profile) {
        return false;
    }
    match traits.knative_service.as_ref().and_then(|k| k.enabled) {
        Some(enabled) => enabled,
        None => profile == Some(TraitProfile::Knative),
    }
}

pub struct KnativeServiceTraitHandler;

impl Trait for KnativeServiceTraitHandler {
    fn name(&self) -> &'static str { KNATIVE_SERVICE }
    fn order(&self) -> i32 { ORDER_WORKLOAD }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Workload] }
    fn accept_profile(&self, profile: Option<TraitProfile>) -> bool { profile_allowed(profile) }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        if !active(traits, ctx.profile()) {
            return Ok(false);
        }
        let spec = traits.knative_service.clone().unwrap_or_default();
        if let (Some(min), Some(max)) = (spec.min_scale, spec.max_scale) {
            if min > max {
                return Err(TraitError::config(KNATIVE_SERVICE, format!("minScale {} exceeds maxScale {}", min, max)));
            }
        }
        if let Some(class) = spec.class.as_deref() {
            one_of(KNATIVE_SERVICE, "class", class, &["kpa.autoscaling.knative.dev", "hpa.autoscaling.knative.dev"])?;
        }
        if let Some(visibility) = spec.visibility.as_deref() {
            one_of(KNATIVE_SERVICE, "visibility", visibility, &["cluster-local"])?;
        }
        Ok(!ctx.has_workload())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.knative_service.clone().unwrap_or_default();

        let mut template_annotations = spec.annotations.clone();
        let autoscaling = [
            ("class", spec.class.clone()),
            ("metric", spec.autoscaling_metric.clone()),
            ("target", spec.autoscaling_target.map(|v| v.to_string())),
            ("minScale", spec.min_scale.map(|v| v.to_string())),
            ("maxScale", spec.max_scale.map(|v| v.to_string())),
        ];
        for (key, value) in autoscaling {
            if let Some(value) = value {
                template_annotations.insert(format!("{}/{}", AUTOSCALING, key), value);
            }
        }

        let mut template = pod_template(ctx);
        if !template_annotations.is_empty() {
            template.metadata.get_or_insert_with(Default::default).annotations = Some(template_annotations);
        }

        let mut metadata = ctx.object_meta();
        let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(BINDINGS_LABEL.to_string(), "true".to_string());
        if let Some(visibility) = spec.visibility {
            labels.insert(VISIBILITY_LABEL.to_string(), visibility);
        }
        if let Some(duration) = spec.rollout_duration {
            metadata.annotations.get_or_insert_with(BTreeMap::new).insert(ROLLOUT_DURATION.to_string(), duration);
        }
        ctx.add(Resource::KnativeService(KnativeService::new(metadata, template)))
    }
}
