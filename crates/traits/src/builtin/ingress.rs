use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
    IngressTLS, ServiceBackendPort,
};
use ktrait_core::Result;
use ktrait_expr::{Traits, INGRESS};
use ktrait_registry::{Resource, TraitContext};

use super::{one_of, ORDER_EXPOSE};
use crate::{Artifact, Trait};

pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_PATH_TYPE: &str = "Prefix";

/// Routes external HTTP traffic to the application Service.
pub struct IngressTraitHandler;

impl Trait for IngressTraitHandler {
    fn name(&self) -> &'static str { INGRESS }
    fn order(&self) -> i32 { ORDER_EXPOSE }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Ingress] }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Service] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let Some(spec) = traits.ingress.as_ref() else { return Ok(false) };
        if spec.enabled != Some(true) {
            return Ok(false);
        }
        if let Some(path_type) = spec.path_type.as_deref() {
            one_of(INGRESS, "pathType", path_type, &["Exact", "Prefix", "ImplementationSpecific"])?;
        }
        Ok(ctx.has_service())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.ingress.clone().unwrap_or_default();
        let Some(service) = ctx.first_service() else { return Ok(()) };
        let backend = IngressServiceBackend {
            name: service.metadata.name.clone().unwrap_or_default(),
            port: Some(ServiceBackendPort {
                name: service
                    .spec
                    .as_ref()
                    .and_then(|s| s.ports.as_ref())
                    .and_then(|p| p.first())
                    .and_then(|p| p.name.clone()),
                ..Default::default()
            }),
        };

        let rule = IngressRule {
            host: spec.host.clone(),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some(spec.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string())),
                    path_type: spec.path_type.clone().unwrap_or_else(|| DEFAULT_PATH_TYPE.to_string()),
                    backend: IngressBackend { service: Some(backend), ..Default::default() },
                }],
            }),
        };
        let tls = (!spec.tls_hosts.is_empty() || spec.tls_secret_name.is_some()).then(|| {
            vec![IngressTLS {
                hosts: (!spec.tls_hosts.is_empty()).then(|| spec.tls_hosts.clone()),
                secret_name: spec.tls_secret_name.clone(),
            }]
        });

        let mut metadata = ctx.object_meta();
        if !spec.annotations.is_empty() {
            metadata.annotations = Some(spec.annotations.clone());
        }
        let ingress = Ingress {
            metadata,
            spec: Some(IngressSpec {
                ingress_class_name: spec.ingress_class_name.clone(),
                rules: Some(vec![rule]),
                tls,
                ..Default::default()
            }),
            ..Default::default()
        };
        ctx.add(Resource::Ingress(ingress))
    }
}
