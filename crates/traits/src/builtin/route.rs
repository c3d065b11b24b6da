use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use ktrait_core::{ClusterType, Result, TraitError, TraitProfile};
use ktrait_expr::{RouteTrait, Traits, ROUTE};
use ktrait_registry::{Resource, Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig, TraitContext};
use tracing::debug;

use super::{one_of, ORDER_EXPOSE};
use crate::{Artifact, Trait};

/// Inline PEM, or the content of the file behind a `file:` reference.
fn tls_material(value: Option<&str>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) => match v.strip_prefix("file:") {
            Some(path) => {
                debug!(path, "route: reading tls material");
                std::fs::read_to_string(path)
                    .map(Some)
                    .map_err(|source| TraitError::Io { path: path.to_string(), source })
            }
            None => Ok(Some(v.to_string())),
        },
    }
}

fn has_tls_material(spec: &RouteTrait) -> bool {
    [&spec.tls_certificate, &spec.tls_key, &spec.tls_ca_certificate, &spec.tls_destination_ca_certificate]
        .iter()
        .any(|v| v.is_some())
}

/// OpenShift Route to the application Service.
pub struct RouteTraitHandler;

impl Trait for RouteTraitHandler {
    fn name(&self) -> &'static str { ROUTE }
    fn order(&self) -> i32 { ORDER_EXPOSE }
    fn produces(&self) -> &'static [Artifact] { &[Artifact::Route] }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Service] }

    fn accept_profile(&self, profile: Option<TraitProfile>) -> bool {
        matches!(profile, None | Some(TraitProfile::Openshift))
    }

    fn accept_cluster(&self, cluster: Option<ClusterType>) -> bool {
        matches!(cluster, None | Some(ClusterType::Openshift))
    }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let Some(spec) = traits.route.as_ref() else { return Ok(false) };
        if spec.enabled != Some(true) {
            return Ok(false);
        }
        match spec.tls_termination.as_deref() {
            Some(termination) => one_of(ROUTE, "tlsTermination", termination, &["edge", "passthrough", "reencrypt"])?,
            None if has_tls_material(spec) => {
                return Err(TraitError::config(ROUTE, "tls certificates given without tlsTermination"));
            }
            None => {}
        }
        if let Some(policy) = spec.tls_insecure_edge_termination_policy.as_deref() {
            one_of(ROUTE, "tlsInsecureEdgeTerminationPolicy", policy, &["None", "Allow", "Redirect"])?;
        }
        Ok(ctx.has_service())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let spec = traits.route.clone().unwrap_or_default();
        let Some(service) = ctx.first_service() else { return Ok(()) };
        let service_name = service.metadata.name.clone().unwrap_or_default();
        let target_port = service
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .and_then(|p| p.first())
            .and_then(|p| p.name.clone());

        let tls = match spec.tls_termination.clone() {
            Some(termination) => Some(TlsConfig {
                termination,
                certificate: tls_material(spec.tls_certificate.as_deref())?,
                key: tls_material(spec.tls_key.as_deref())?,
                ca_certificate: tls_material(spec.tls_ca_certificate.as_deref())?,
                destination_ca_certificate: tls_material(spec.tls_destination_ca_certificate.as_deref())?,
                insecure_edge_termination_policy: spec.tls_insecure_edge_termination_policy.clone(),
            }),
            None => None,
        };

        let mut metadata = ctx.object_meta();
        if !spec.annotations.is_empty() {
            metadata.annotations = Some(spec.annotations.clone());
        }
        let route = Route::new(
            metadata,
            RouteSpec {
                host: spec.host.clone(),
                path: None,
                to: RouteTargetReference { kind: "Service".to_string(), name: service_name, weight: Some(100) },
                port: target_port.map(|p| RoutePort { target_port: IntOrString::String(p) }),
                tls,
            },
        );
        ctx.add(Resource::Route(route))
    }
}
