use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use ktrait_core::Result;
use ktrait_expr::{Traits, SERVICE};
use ktrait_registry::{Resource, TraitContext};

use super::container::DEFAULT_PORT_NAME;
use super::{one_of, ORDER_SERVICE};
use crate::{Artifact, Trait};

pub const DEFAULT_SERVICE_PORT: i32 = 80;

/// Exposes the application container port through a Service.
pub struct ServiceTraitHandler;

impl Trait for ServiceTraitHandler {
    fn name(&self) -> &'static str { SERVICE }
    fn order(&self) -> i32 { ORDER_SERVICE }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Service] }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Container] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let spec = traits.service.clone().unwrap_or_default();
        if spec.enabled == Some(false) {
            return Ok(false);
        }
        if let Some(kind) = spec.type_.as_deref() {
            one_of(SERVICE, "type", kind, &["ClusterIP", "NodePort", "LoadBalancer", "ExternalName"])?;
        }
        if !ctx.has_deployment() {
            return Ok(false);
        }
        if spec.enabled != Some(true) && !ctx.source().exposes_http {
            return Ok(false);
        }
        let has_port = ctx.app_container().and_then(|c| c.ports.as_ref()).is_some_and(|p| !p.is_empty());
        Ok(has_port)
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.service.clone().unwrap_or_default();
        let container = traits.container.clone().unwrap_or_default();
        let target = ctx
            .app_container()
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.first())
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| DEFAULT_PORT_NAME.to_string());

        let service = Service {
            metadata: ctx.object_meta(),
            spec: Some(ServiceSpec {
                type_: Some(spec.type_.unwrap_or_else(|| "ClusterIP".to_string())),
                selector: Some(ctx.selector_labels()),
                ports: Some(vec![ServicePort {
                    name: Some(container.service_port_name.unwrap_or_else(|| DEFAULT_PORT_NAME.to_string())),
                    port: container.service_port.unwrap_or(DEFAULT_SERVICE_PORT),
                    target_port: Some(IntOrString::String(target)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        ctx.add(Resource::Service(service))
    }
}
