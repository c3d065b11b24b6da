use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, ContainerPort, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use ktrait_core::{Result, RuntimeType};
use ktrait_expr::{ContainerTrait, Traits, CONTAINER};
use ktrait_registry::{TraitContext, APPLICATION_PROPERTIES};
use tracing::debug;

use super::{cronjob, one_of, ORDER_CONTAINER};
use crate::{Artifact, Trait};

pub const DEFAULT_PORT: i32 = 8080;
pub const DEFAULT_PORT_NAME: &str = "http";
pub const DEFAULT_MANAGEMENT_PORT: i32 = 9876;
/// Knative only accepts these container port names.
const KNATIVE_PORT_NAME: &str = "http1";

/// Port the application listens on, if it should expose one.
fn container_port(spec: &ContainerTrait, traits: &Traits, ctx: &TraitContext) -> Option<i32> {
    if spec.port.is_some() {
        return spec.port;
    }
    let service_enabled = traits.service.as_ref().and_then(|s| s.enabled) == Some(true);
    (ctx.source().exposes_http || service_enabled || ctx.has_knative_service()).then_some(DEFAULT_PORT)
}

fn quantities(cpu: &Option<String>, memory: &Option<String>) -> Option<BTreeMap<String, Quantity>> {
    let mut out = BTreeMap::new();
    if let Some(cpu) = cpu {
        out.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = memory {
        out.insert("memory".to_string(), Quantity(memory.clone()));
    }
    (!out.is_empty()).then_some(out)
}

/// Image, ports and resources of the application container.
pub struct ContainerTraitHandler;

impl Trait for ContainerTraitHandler {
    fn name(&self) -> &'static str { CONTAINER }
    fn order(&self) -> i32 { ORDER_CONTAINER }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Container] }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Workload] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let spec = traits.container.clone().unwrap_or_default();
        if spec.enabled == Some(false) {
            return Ok(false);
        }
        if let Some(policy) = spec.image_pull_policy.as_deref() {
            one_of(CONTAINER, "imagePullPolicy", policy, &["Always", "Never", "IfNotPresent"])?;
        }
        Ok(ctx.has_workload())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.container.clone().unwrap_or_default();
        let port = container_port(&spec, traits, ctx);
        let knative = ctx.has_knative_service();
        let image = spec.image.clone().unwrap_or_else(|| format!("{}:{}", ctx.name(), ctx.version()));

        let requests = quantities(&spec.request_cpu, &spec.request_memory);
        let limits = quantities(&spec.limit_cpu, &spec.limit_memory);
        let resources = (requests.is_some() || limits.is_some())
            .then(|| ResourceRequirements { requests, limits, ..Default::default() });

        let ports = port.map(|p| {
            let name = match spec.port_name.clone() {
                Some(name) => name,
                None if knative => KNATIVE_PORT_NAME.to_string(),
                None => DEFAULT_PORT_NAME.to_string(),
            };
            vec![ContainerPort { container_port: p, name: Some(name), protocol: Some("TCP".to_string()), ..Default::default() }]
        });

        let container = Container {
            name: spec.name.clone().unwrap_or_else(|| ctx.name().to_string()),
            image: Some(image),
            image_pull_policy: spec.image_pull_policy.clone(),
            ports,
            resources,
            ..Default::default()
        };
        debug!(name = %container.name, port = ?port, "container: configured");
        ctx.visit_pod_specs(|pod| match pod.containers.first_mut() {
            Some(existing) => *existing = container.clone(),
            None => pod.containers.push(container.clone()),
        });
        Ok(())
    }

    fn apply_runtime_specific(&self, traits: &Traits, ctx: &mut TraitContext, runtime: RuntimeType) -> Result<()> {
        if let Some(port) = traits.container.as_ref().and_then(|c| c.port) {
            let key = match runtime {
                RuntimeType::Quarkus => "quarkus.http.port",
                RuntimeType::SpringBoot => "server.port",
                RuntimeType::Main => "camel.server.port",
            };
            ctx.add_configuration_resource(APPLICATION_PROPERTIES, format!("{}={}", key, port));
        }
        // Scheduled runs exit once idle and expose no probes.
        if !cronjob::active(traits) {
            add_health_endpoints(ctx, runtime);
        }
        Ok(())
    }
}

/// Management server settings the probes of each runtime rely on. Health
/// endpoints live under `/observe`.
fn add_health_endpoints(ctx: &mut TraitContext, runtime: RuntimeType) {
    let port = ctx.management_port().unwrap_or(DEFAULT_MANAGEMENT_PORT);
    let lines = match runtime {
        RuntimeType::Quarkus => vec![format!("quarkus.management.port={}", port)],
        RuntimeType::SpringBoot => vec![
            "management.endpoints.web.base-path=/observe".to_string(),
            format!("management.server.port={}", port),
            "management.health.probes.enabled=true".to_string(),
        ],
        RuntimeType::Main => vec![format!("camel.management.port={}", port)],
    };
    for line in lines {
        ctx.add_configuration_resource(APPLICATION_PROPERTIES, line);
    }
}
