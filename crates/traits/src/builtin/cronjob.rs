use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use ktrait_core::{Result, RuntimeType, TraitError};
use ktrait_expr::{CronJobTrait, Traits, CRONJOB};
use ktrait_registry::{Resource, TraitContext, APPLICATION_PROPERTIES};

use super::{knative_service, one_of, pod_template, ORDER_WORKLOAD};
use crate::{Artifact, Trait};

pub(crate) fn active(traits: &Traits) -> bool {
    traits.cronjob.as_ref().and_then(|c| c.enabled) == Some(true)
}

/// Scheduled workload. The application shuts down after idling so each run
/// completes.
pub struct CronJobTraitHandler;

impl Trait for CronJobTraitHandler {
    fn name(&self) -> &'static str { CRONJOB }
    fn order(&self) -> i32 { ORDER_WORKLOAD }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Workload] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let Some(spec) = traits.cronjob.as_ref().filter(|_| active(traits)) else {
            return Ok(false);
        };
        let schedule = spec.schedule.as_deref().unwrap_or_default();
        if !schedule.starts_with('@') && schedule.split_whitespace().count() != 5 {
            return Err(TraitError::config(CRONJOB, format!("schedule `{}` must have five fields", schedule)));
        }
        if let Some(policy) = spec.concurrency_policy.as_deref() {
            one_of(CRONJOB, "concurrencyPolicy", policy, &["Allow", "Forbid", "Replace"])?;
        }
        if knative_service::active(traits, ctx.profile()) {
            return Err(TraitError::config(CRONJOB, "cannot be combined with an active knative-service trait"));
        }
        Ok(!ctx.has_workload())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.cronjob.clone().unwrap_or_default();
        let mut template = pod_template(ctx);
        if let Some(pod) = template.spec.as_mut() {
            pod.restart_policy = Some("OnFailure".to_string());
        }
        let cronjob = CronJob {
            metadata: ctx.object_meta(),
            spec: Some(CronJobSpec {
                schedule: spec.schedule.unwrap_or_default(),
                time_zone: spec.time_zone,
                concurrency_policy: spec.concurrency_policy,
                starting_deadline_seconds: spec.starting_deadline_seconds,
                job_template: JobTemplateSpec {
                    metadata: None,
                    spec: Some(JobSpec {
                        active_deadline_seconds: spec.active_deadline_seconds,
                        backoff_limit: spec.backoff_limit,
                        template,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        ctx.add(Resource::CronJob(cronjob))
    }

    fn apply_runtime_specific(&self, traits: &Traits, ctx: &mut TraitContext, _runtime: RuntimeType) -> Result<()> {
        let idle = traits.cronjob.as_ref().map(|c| c.duration_max_idle_seconds()).unwrap_or(CronJobTrait::DEFAULT_DURATION_MAX_IDLE_SECONDS);
        ctx.add_configuration_resource(APPLICATION_PROPERTIES, format!("camel.main.duration-max-idle-seconds={}", idle));
        Ok(())
    }
}
