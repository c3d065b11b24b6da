//! Typed trait configuration built from parsed option bags.

use std::collections::BTreeMap;

use ktrait_core::{OptValue, OptionBag, Scalar};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{lenient, ExprError, Result};

pub const CONTAINER: &str = "container";
pub const DEPLOYMENT: &str = "deployment";
pub const CRONJOB: &str = "cronjob";
pub const KNATIVE_SERVICE: &str = "knative-service";
pub const ENV: &str = "env";
pub const MOUNT: &str = "mount";
pub const OPENAPI: &str = "openapi";
pub const JOLOKIA: &str = "jolokia";
pub const SERVICE: &str = "service";
pub const INGRESS: &str = "ingress";
pub const ROUTE: &str = "route";
/// Carries `--connect` targets. No handler ships for it.
pub const SERVICE_BINDING: &str = "service-binding";

/// Trait names with a typed model; anything else lands in `addons`.
pub const KNOWN_TRAITS: &[&str] = &[
    CONTAINER, DEPLOYMENT, CRONJOB, KNATIVE_SERVICE, ENV, MOUNT, OPENAPI, JOLOKIA, SERVICE, INGRESS, ROUTE,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub image_pull_policy: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i32")]
    pub port: Option<i32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub port_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i32")]
    pub service_port: Option<i32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub service_port_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub request_cpu: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub request_memory: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub limit_cpu: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub limit_memory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeploymentTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_i32")]
    pub replicas: Option<i32>,
    /// `RollingUpdate` or `Recreate`.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub strategy: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i32")]
    pub progress_deadline_seconds: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CronJobTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub schedule: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub time_zone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub concurrency_policy: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub starting_deadline_seconds: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_i32")]
    pub backoff_limit: Option<i32>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub duration_max_idle_seconds: Option<i64>,
}

impl CronJobTrait {
    pub const DEFAULT_DURATION_MAX_IDLE_SECONDS: i64 = 5;

    pub fn duration_max_idle_seconds(&self) -> i64 {
        self.duration_max_idle_seconds.unwrap_or(Self::DEFAULT_DURATION_MAX_IDLE_SECONDS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KnativeServiceTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub class: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub autoscaling_metric: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub autoscaling_target: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub min_scale: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub max_scale: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub rollout_duration: Option<String>,
    /// `cluster-local` keeps the service off the public ingress.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub visibility: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// `NAME=value` entries.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MountTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// `configmap:name[/key]` or `secret:name[/key]`, mounted as configuration.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub configs: Vec<String>,
    /// Same as configs plus an optional `@path`, mounted as resources.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub resources: Vec<String>,
    /// `claim:path`
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub volumes: Vec<String>,
}

impl MountTrait {
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty() && self.resources.is_empty() && self.volumes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenApiTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// `name[/key]` of ConfigMaps holding OpenAPI documents.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub configmaps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JolokiaTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_i32")]
    pub port: Option<i32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub container_port_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string")]
    pub type_: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngressTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub path_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub ingress_class_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub tls_hosts: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_secret_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteTrait {
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub annotations: BTreeMap<String, String>,
    /// `edge`, `passthrough` or `reencrypt`.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_termination: Option<String>,
    /// Inline PEM or `file:<path>`; the same applies to the other TLS fields.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_certificate: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_key: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_ca_certificate: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_destination_ca_certificate: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tls_insecure_edge_termination_policy: Option<String>,
}

/// Merged configuration of every trait for one catalog run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Traits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cronjob: Option<CronJobTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knative_service: Option<KnativeServiceTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount: Option<MountTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openapi: Option<OpenApiTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jolokia: Option<JolokiaTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressTrait>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteTrait>,
    /// Unrecognized trait names with their raw options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addons: BTreeMap<String, OptionBag>,
}

fn typed<T: serde::de::DeserializeOwned>(trait_name: &str, bag: OptionBag) -> Result<T> {
    let json = serde_json::to_value(bag).map_err(|source| ExprError::Model { trait_name: trait_name.to_string(), source })?;
    serde_json::from_value(json).map_err(|source| ExprError::Model { trait_name: trait_name.to_string(), source })
}

impl Traits {
    /// Lift raw option bags into the typed model.
    pub fn from_bags(bags: BTreeMap<String, OptionBag>) -> Result<Self> {
        let mut out = Traits::default();
        for (name, bag) in bags {
            match name.as_str() {
                CONTAINER => out.container = Some(typed(&name, bag)?),
                DEPLOYMENT => out.deployment = Some(typed(&name, bag)?),
                CRONJOB => out.cronjob = Some(typed(&name, bag)?),
                KNATIVE_SERVICE => out.knative_service = Some(typed(&name, bag)?),
                ENV => out.env = Some(typed(&name, bag)?),
                MOUNT => out.mount = Some(typed(&name, bag)?),
                OPENAPI => out.openapi = Some(typed(&name, bag)?),
                JOLOKIA => out.jolokia = Some(typed(&name, bag)?),
                SERVICE => out.service = Some(typed(&name, bag)?),
                INGRESS => out.ingress = Some(typed(&name, bag)?),
                ROUTE => out.route = Some(typed(&name, bag)?),
                _ => {
                    debug!(addon = %name, options = bag.len(), "keeping unrecognized trait as addon");
                    out.addons.insert(name, bag);
                }
            }
        }
        Ok(out)
    }

    pub fn addon_option(&self, name: &str, key: &str) -> Option<&OptValue> {
        self.addons.get(name).and_then(|bag| bag.get(key))
    }

    /// Append `--connect` targets to `service-binding.services`.
    pub fn configure_connects<S: AsRef<str>>(&mut self, connects: &[S]) {
        if connects.is_empty() {
            return;
        }
        let mut services: Vec<Scalar> = match self.addon_option(SERVICE_BINDING, "services") {
            Some(OptValue::List(items)) => items.to_vec(),
            Some(OptValue::Scalar(s)) => vec![s.clone()],
            _ => Vec::new(),
        };
        for c in connects {
            let c = Scalar::Str(c.as_ref().to_string());
            if !services.contains(&c) {
                services.push(c);
            }
        }
        self.addons
            .entry(SERVICE_BINDING.to_string())
            .or_default()
            .insert("services".to_string(), OptValue::List(services.into()));
    }

    /// Append `--env NAME=value` flags.
    pub fn configure_env_vars<S: AsRef<str>>(&mut self, vars: &[S]) {
        if vars.is_empty() {
            return;
        }
        let env = self.env.get_or_insert_with(EnvTrait::default);
        for v in vars {
            let v = v.as_ref().to_string();
            if !env.vars.contains(&v) {
                env.vars.push(v);
            }
        }
    }

    /// Append `--config`, `--resource` and `--volume` flags to the mount trait.
    pub fn configure_mount<S: AsRef<str>>(&mut self, configs: &[S], resources: &[S], volumes: &[S]) {
        if configs.is_empty() && resources.is_empty() && volumes.is_empty() {
            return;
        }
        let mount = self.mount.get_or_insert_with(MountTrait::default);
        mount.configs.extend(configs.iter().map(|s| s.as_ref().to_string()));
        mount.resources.extend(resources.iter().map(|s| s.as_ref().to_string()));
        mount.volumes.extend(volumes.iter().map(|s| s.as_ref().to_string()));
    }

    /// Register a `configmap:name[/key]` OpenAPI document. Returns false for
    /// references the openapi trait cannot mount (e.g. local files).
    pub fn configure_open_api_spec(&mut self, spec: &str) -> bool {
        match spec.strip_prefix("configmap:") {
            Some(reference) => {
                self.openapi.get_or_insert_with(OpenApiTrait::default).configmaps.push(reference.to_string());
                true
            }
            None => false,
        }
    }

    /// Fill `container.image` unless it was configured explicitly: an explicit
    /// image wins, otherwise `[registry/][group/]name:version`.
    pub fn configure_container_image(
        &mut self,
        image: Option<&str>,
        registry: Option<&str>,
        group: Option<&str>,
        name: &str,
        version: &str,
    ) {
        let container = self.container.get_or_insert_with(ContainerTrait::default);
        if container.image.is_some() {
            return;
        }
        let resolved = match image {
            Some(image) => image.to_string(),
            None => {
                let mut out = String::new();
                for part in [registry, group].into_iter().flatten() {
                    out.push_str(part);
                    out.push('/');
                }
                out.push_str(&format!("{}:{}", name, version));
                out
            }
        };
        container.image = Some(resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_traits;

    #[test]
    fn container_options_are_typed() {
        let traits = parse_traits(&[
            "container.port=8088",
            "container.port-name=custom",
            "container.service-port-name=custom-port",
            "container.image-pull-policy=IfNotPresent",
            "container.service-port=443",
            "container.request-cpu=5m",
            "container.request-memory=100Mi",
            "container.limit-cpu=0.5",
            "container.limit-memory=512Mi",
        ])
        .unwrap();
        let c = traits.container.unwrap();
        assert_eq!(c.port, Some(8088));
        assert_eq!(c.port_name.as_deref(), Some("custom"));
        assert_eq!(c.service_port, Some(443));
        assert_eq!(c.service_port_name.as_deref(), Some("custom-port"));
        assert_eq!(c.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert_eq!(c.request_cpu.as_deref(), Some("5m"));
        assert_eq!(c.limit_cpu.as_deref(), Some("0.5"));
    }

    #[test]
    fn numeric_strings_stay_strings_for_quantities() {
        let traits = parse_traits(&["container.request-cpu=1"]).unwrap();
        assert_eq!(traits.container.unwrap().request_cpu.as_deref(), Some("1"));
    }

    #[test]
    fn ingress_annotations_build_a_map() {
        let traits = parse_traits(&[
            "ingress.enabled=true",
            "ingress.path=/something(/|$)(.*)",
            "ingress.pathType=ImplementationSpecific",
            "ingress.annotations=nginx.ingress.kubernetes.io/rewrite-target=/$2",
            "ingress.annotations=nginx.ingress.kubernetes.io/use-regex=true",
        ])
        .unwrap();
        let ing = traits.ingress.unwrap();
        assert_eq!(ing.enabled, Some(true));
        assert_eq!(ing.path.as_deref(), Some("/something(/|$)(.*)"));
        assert_eq!(ing.path_type.as_deref(), Some("ImplementationSpecific"));
        assert_eq!(ing.annotations.get("nginx.ingress.kubernetes.io/rewrite-target").map(String::as_str), Some("/$2"));
        assert_eq!(ing.annotations.get("nginx.ingress.kubernetes.io/use-regex").map(String::as_str), Some("true"));
    }

    #[test]
    fn connects_extend_the_service_binding_addon() {
        let mut traits = parse_traits(&["service-binding.services=serving.knative.dev/v1:Service:billing"]).unwrap();
        traits.configure_connects(&["apps/v1:Deployment:ns/orders", "apps/v1:Deployment:ns/orders"]);
        assert_eq!(
            traits.addon_option(SERVICE_BINDING, "services"),
            Some(&OptValue::list(["serving.knative.dev/v1:Service:billing", "apps/v1:Deployment:ns/orders"]))
        );
    }

    #[test]
    fn unknown_traits_become_addons() {
        let traits = parse_traits(&["telemetry.enabled=true", "telemetry.endpoint=http://otel:4317"]).unwrap();
        assert!(traits.container.is_none());
        assert_eq!(traits.addon_option("telemetry", "enabled"), Some(&OptValue::bool(true)));
        assert_eq!(traits.addon_option("telemetry", "endpoint"), Some(&OptValue::str("http://otel:4317")));
    }

    #[test]
    fn unknown_options_of_known_traits_fail() {
        let err = parse_traits(&["service.colour=blue"]).unwrap_err();
        assert!(matches!(err, ExprError::Model { ref trait_name, .. } if trait_name == "service"), "{err}");
    }

    #[test]
    fn service_type_uses_reserved_word() {
        let traits = parse_traits(&["service.type=NodePort"]).unwrap();
        assert_eq!(traits.service.unwrap().type_.as_deref(), Some("NodePort"));
    }

    #[test]
    fn helpers_extend_the_spec() {
        let mut traits = Traits::default();
        traits.configure_env_vars(&["CAMEL_FOO=bar", "MY_ENV=foo", "CAMEL_FOO=bar"]);
        assert_eq!(traits.env.as_ref().unwrap().vars, vec!["CAMEL_FOO=bar", "MY_ENV=foo"]);

        traits.configure_mount(&["secret:foo"], &["configmap:foo/file.txt"], &["pvc-foo:/data"]);
        let m = traits.mount.as_ref().unwrap();
        assert_eq!(m.configs, vec!["secret:foo"]);
        assert_eq!(m.resources, vec!["configmap:foo/file.txt"]);
        assert_eq!(m.volumes, vec!["pvc-foo:/data"]);

        assert!(traits.configure_open_api_spec("configmap:openapi/spec.yaml"));
        assert!(!traits.configure_open_api_spec("file:spec.yaml"));
        assert_eq!(traits.openapi.as_ref().unwrap().configmaps, vec!["openapi/spec.yaml"]);

        traits.configure_container_image(None, Some("quay.io"), Some("camel-test"), "route", "1.0.0");
        assert_eq!(traits.container.as_ref().unwrap().image.as_deref(), Some("quay.io/camel-test/route:1.0.0"));
        traits.configure_container_image(Some("other:2"), None, None, "route", "1.0.0");
        assert_eq!(traits.container.as_ref().unwrap().image.as_deref(), Some("quay.io/camel-test/route:1.0.0"));
    }
}
