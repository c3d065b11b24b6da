//! ktrait registry: the ordered set of manifests a catalog run builds, plus
//! the run metadata traits read while deciding what to generate.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use ktrait_core::{ClusterType, Result, RuntimeType, TraitError, TraitProfile, KUBERNETES_LABEL_NAME};
use serde::Serialize;
use tracing::debug;

pub mod custom;

pub use custom::{KnativeService, Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};

/// Property file that receives runtime configuration lines.
pub const APPLICATION_PROPERTIES: &str = "application.properties";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Deployment,
    CronJob,
    KnativeService,
    Service,
    Ingress,
    Route,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::CronJob => "cronjob",
            ResourceKind::KnativeService => "knative-service",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Route => "route",
        }
    }

    /// Workloads own the pod template; a registry holds at most one.
    pub fn is_workload(&self) -> bool {
        matches!(self, ResourceKind::Deployment | ResourceKind::CronJob | ResourceKind::KnativeService)
    }
}

/// A manifest under construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Deployment(Deployment),
    CronJob(CronJob),
    KnativeService(KnativeService),
    Service(Service),
    Ingress(Ingress),
    Route(Route),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Deployment(_) => ResourceKind::Deployment,
            Resource::CronJob(_) => ResourceKind::CronJob,
            Resource::KnativeService(_) => ResourceKind::KnativeService,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Ingress(_) => ResourceKind::Ingress,
            Resource::Route(_) => ResourceKind::Route,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Deployment(r) => &r.metadata,
            Resource::CronJob(r) => &r.metadata,
            Resource::KnativeService(r) => &r.metadata,
            Resource::Service(r) => &r.metadata,
            Resource::Ingress(r) => &r.metadata,
            Resource::Route(r) => &r.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Deployment(r) => &mut r.metadata,
            Resource::CronJob(r) => &mut r.metadata,
            Resource::KnativeService(r) => &mut r.metadata,
            Resource::Service(r) => &mut r.metadata,
            Resource::Ingress(r) => &mut r.metadata,
            Resource::Route(r) => &mut r.metadata,
        }
    }

    pub fn name(&self) -> &str { self.metadata().name.as_deref().unwrap_or_default() }

    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Resource::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
            Resource::CronJob(c) => c.spec.as_ref().and_then(|s| s.job_template.spec.as_ref()).map(|j| &j.template),
            Resource::KnativeService(k) => Some(&k.spec.template),
            _ => None,
        }
    }

    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Resource::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
            Resource::CronJob(c) => c.spec.as_mut().and_then(|s| s.job_template.spec.as_mut()).map(|j| &mut j.template),
            Resource::KnativeService(k) => Some(&mut k.spec.template),
            _ => None,
        }
    }

    pub fn pod_spec(&self) -> Option<&PodSpec> { self.pod_template().and_then(|t| t.spec.as_ref()) }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> { serde_json::to_value(self) }
}

/// What the source inspector found out about the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub exposes_http: bool,
}

macro_rules! kind_accessors {
    ($variant:ident, $ty:ty, $first:ident, $visit:ident, $has:ident) => {
        pub fn $first(&self) -> Option<&$ty> {
            self.resources.iter().find_map(|r| match r {
                Resource::$variant(x) => Some(x),
                _ => None,
            })
        }

        pub fn $visit<F: FnMut(&mut $ty)>(&mut self, mut f: F) {
            for r in self.resources.iter_mut() {
                if let Resource::$variant(x) = r {
                    f(x);
                }
            }
        }

        pub fn $has(&self) -> bool { self.$first().is_some() }
    };
}

/// Shared state of one catalog run.
#[derive(Debug, Clone, Default)]
pub struct TraitContext {
    name: String,
    version: String,
    profile: Option<TraitProfile>,
    cluster_type: Option<ClusterType>,
    runtime: RuntimeType,
    service_account: Option<String>,
    management_port: Option<i32>,
    source: SourceMetadata,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    resources: Vec<Resource>,
    configuration_resources: BTreeMap<String, Vec<String>>,
}

impl TraitContext {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into(), ..Default::default() }
    }

    pub fn with_profile(mut self, profile: Option<TraitProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_cluster_type(mut self, cluster_type: Option<ClusterType>) -> Self {
        self.cluster_type = cluster_type;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeType) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_service_account(mut self, service_account: Option<String>) -> Self {
        self.service_account = service_account;
        self
    }

    pub fn with_management_port(mut self, port: Option<i32>) -> Self {
        self.management_port = port;
        self
    }

    pub fn with_source(mut self, source: SourceMetadata) -> Self {
        self.source = source;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn version(&self) -> &str { &self.version }
    pub fn profile(&self) -> Option<TraitProfile> { self.profile }
    pub fn cluster_type(&self) -> Option<ClusterType> { self.cluster_type }
    pub fn runtime(&self) -> RuntimeType { self.runtime }
    pub fn service_account(&self) -> Option<&str> { self.service_account.as_deref() }
    pub fn management_port(&self) -> Option<i32> { self.management_port }
    pub fn source(&self) -> &SourceMetadata { &self.source }

    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn labels(&self) -> &BTreeMap<String, String> { &self.labels }
    pub fn annotations(&self) -> &BTreeMap<String, String> { &self.annotations }

    /// Labels tying pods to their workload and service.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(KUBERNETES_LABEL_NAME.to_string(), self.name.clone())])
    }

    /// Metadata for a new top-level resource named after the application.
    pub fn object_meta(&self) -> ObjectMeta {
        ObjectMeta { name: Some(self.name.clone()), labels: Some(self.selector_labels()), ..Default::default() }
    }

    /// Register a manifest. A second workload is rejected.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        let kind = resource.kind();
        if kind.is_workload() {
            if let Some(existing) = self.workload() {
                return Err(TraitError::DuplicateWorkload { existing: existing.kind().as_str(), added: kind.as_str() });
            }
        }
        debug!(kind = kind.as_str(), name = resource.name(), "resource registered");
        self.resources.push(resource);
        Ok(())
    }

    pub fn resources(&self) -> &[Resource] { &self.resources }
    pub fn len(&self) -> usize { self.resources.len() }
    pub fn is_empty(&self) -> bool { self.resources.is_empty() }

    pub fn workload(&self) -> Option<&Resource> { self.resources.iter().find(|r| r.kind().is_workload()) }
    pub fn has_workload(&self) -> bool { self.workload().is_some() }

    kind_accessors!(Deployment, Deployment, first_deployment, visit_deployments, has_deployment);
    kind_accessors!(CronJob, CronJob, first_cron_job, visit_cron_jobs, has_cron_job);
    kind_accessors!(KnativeService, KnativeService, first_knative_service, visit_knative_services, has_knative_service);
    kind_accessors!(Service, Service, first_service, visit_services, has_service);
    kind_accessors!(Ingress, Ingress, first_ingress, visit_ingresses, has_ingress);
    kind_accessors!(Route, Route, first_route, visit_routes, has_route);

    pub fn visit_pod_templates<F: FnMut(&mut PodTemplateSpec)>(&mut self, mut f: F) {
        for r in self.resources.iter_mut() {
            if let Some(t) = r.pod_template_mut() {
                f(t);
            }
        }
    }

    pub fn visit_pod_specs<F: FnMut(&mut PodSpec)>(&mut self, mut f: F) {
        self.visit_pod_templates(|t| f(t.spec.get_or_insert_with(PodSpec::default)));
    }

    pub fn visit_containers<F: FnMut(&mut Container)>(&mut self, mut f: F) {
        self.visit_pod_specs(|spec| spec.containers.iter_mut().for_each(&mut f));
    }

    pub fn pod_spec(&self) -> Option<&PodSpec> { self.workload().and_then(Resource::pod_spec) }

    /// The application container is the first container of the workload.
    pub fn app_container(&self) -> Option<&Container> { self.pod_spec().and_then(|s| s.containers.first()) }

    pub fn visit_app_container<F: FnOnce(&mut Container)>(&mut self, f: F) {
        let mut f = Some(f);
        self.visit_pod_specs(|spec| {
            if let (Some(c), Some(f)) = (spec.containers.first_mut(), f.take()) {
                f(c);
            }
        });
    }

    /// Append a line to a generated property file.
    pub fn add_configuration_resource(&mut self, file: impl Into<String>, line: impl Into<String>) {
        let line = line.into();
        let lines = self.configuration_resources.entry(file.into()).or_default();
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    pub fn configuration_resources(&self) -> &BTreeMap<String, Vec<String>> { &self.configuration_resources }

    /// Final manifests in registration order, with context labels and
    /// annotations fanned out. Keys already set on a resource win.
    pub fn build_items(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .cloned()
            .map(|mut r| {
                let meta = r.metadata_mut();
                if !self.labels.is_empty() {
                    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
                    for (k, v) in &self.labels {
                        labels.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                if !self.annotations.is_empty() {
                    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
                    for (k, v) in &self.annotations {
                        annotations.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                r
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::ServiceSpec;

    fn deployment(ctx: &TraitContext) -> Resource {
        Resource::Deployment(Deployment {
            metadata: ctx.object_meta(),
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container { name: ctx.name().to_string(), ..Default::default() }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn second_workload_is_rejected() {
        let mut ctx = TraitContext::new("demo", "1.0");
        ctx.add(deployment(&ctx)).unwrap();
        let knative = KnativeService::new(ctx.object_meta(), PodTemplateSpec::default());
        let err = ctx.add(Resource::KnativeService(knative)).unwrap_err();
        assert!(matches!(err, TraitError::DuplicateWorkload { existing: "deployment", added: "knative-service" }));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn visits_are_keyed_by_kind() {
        let mut ctx = TraitContext::new("demo", "1.0");
        ctx.add(deployment(&ctx)).unwrap();
        ctx.add(Resource::Service(Service { metadata: ctx.object_meta(), spec: Some(ServiceSpec::default()), ..Default::default() }))
            .unwrap();
        assert!(ctx.has_deployment() && ctx.has_service() && !ctx.has_ingress());

        let mut seen = 0;
        ctx.visit_services(|s| {
            s.spec.get_or_insert_with(Default::default).type_ = Some("NodePort".into());
            seen += 1;
        });
        assert_eq!(seen, 1);
        ctx.visit_app_container(|c| c.image = Some("demo:1.0".into()));
        assert_eq!(ctx.app_container().and_then(|c| c.image.as_deref()), Some("demo:1.0"));
        assert_eq!(ctx.first_service().and_then(|s| s.spec.as_ref()).and_then(|s| s.type_.as_deref()), Some("NodePort"));
    }

    #[test]
    fn build_items_fans_out_labels_without_overwriting() {
        let mut ctx = TraitContext::new("demo", "1.0");
        ctx.add_label(KUBERNETES_LABEL_NAME, "other");
        ctx.add_label("team", "payments");
        ctx.add_annotation("owner", "ops");
        ctx.add(deployment(&ctx)).unwrap();
        let items = ctx.build_items();
        let meta = items[0].metadata();
        let labels = meta.labels.as_ref().unwrap();
        assert_eq!(labels[KUBERNETES_LABEL_NAME], "demo");
        assert_eq!(labels["team"], "payments");
        assert_eq!(meta.annotations.as_ref().unwrap()["owner"], "ops");
        // the registry itself is untouched
        assert!(ctx.resources()[0].metadata().annotations.is_none());
    }

    #[test]
    fn configuration_lines_are_deduplicated() {
        let mut ctx = TraitContext::new("demo", "1.0");
        ctx.add_configuration_resource(APPLICATION_PROPERTIES, "quarkus.http.port=8088");
        ctx.add_configuration_resource(APPLICATION_PROPERTIES, "quarkus.http.port=8088");
        assert_eq!(ctx.configuration_resources()[APPLICATION_PROPERTIES], vec!["quarkus.http.port=8088"]);
    }

    #[test]
    fn custom_resources_serialize_with_type_meta() {
        let route = Route::new(
            ObjectMeta { name: Some("demo".into()), ..Default::default() },
            RouteSpec {
                to: RouteTargetReference { kind: "Service".into(), name: "demo".into(), weight: None },
                tls: Some(TlsConfig {
                    termination: "reencrypt".into(),
                    destination_ca_certificate: Some("PEM".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let v = Resource::Route(route).to_json().unwrap();
        assert_eq!(v["apiVersion"], "route.openshift.io/v1");
        assert_eq!(v["kind"], "Route");
        assert_eq!(v["spec"]["tls"]["destinationCACertificate"], "PEM");
        assert!(v["spec"].get("host").is_none());
    }
}
