use k8s_openapi::api::core::v1::ContainerPort;
use ktrait_core::Result;
use ktrait_expr::{Traits, JOLOKIA};
use ktrait_registry::TraitContext;

use super::ORDER_JOLOKIA;
use crate::{Artifact, Trait};

pub const DEFAULT_PORT: i32 = 8778;
pub const DEFAULT_PORT_NAME: &str = "jolokia";

/// Exposes the Jolokia agent port on the application container.
pub struct JolokiaTraitHandler;

impl Trait for JolokiaTraitHandler {
    fn name(&self) -> &'static str { JOLOKIA }
    fn order(&self) -> i32 { ORDER_JOLOKIA }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Container] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let enabled = traits.jolokia.as_ref().and_then(|j| j.enabled) == Some(true);
        Ok(enabled && ctx.app_container().is_some())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.jolokia.clone().unwrap_or_default();
        let port = ContainerPort {
            container_port: spec.port.unwrap_or(DEFAULT_PORT),
            name: Some(spec.container_port_name.unwrap_or_else(|| DEFAULT_PORT_NAME.to_string())),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        };
        ctx.visit_app_container(|c| {
            let ports = c.ports.get_or_insert_with(Vec::new);
            ports.retain(|p| p.name != port.name);
            ports.push(port);
        });
        Ok(())
    }
}
