//! Built-in traits.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use ktrait_registry::TraitContext;

use crate::Trait;

mod container;
mod cronjob;
mod deployment;
mod env;
mod ingress;
mod jolokia;
mod knative_service;
mod mount;
mod openapi;
mod route;
mod service;

pub use container::ContainerTraitHandler;
pub use cronjob::CronJobTraitHandler;
pub use deployment::DeploymentTraitHandler;
pub use env::EnvTraitHandler;
pub use ingress::IngressTraitHandler;
pub use jolokia::JolokiaTraitHandler;
pub use knative_service::KnativeServiceTraitHandler;
pub use mount::MountTraitHandler;
pub use openapi::OpenApiTraitHandler;
pub use route::RouteTraitHandler;
pub use service::ServiceTraitHandler;

pub const ORDER_WORKLOAD: i32 = 1000;
pub const ORDER_CONTAINER: i32 = 1600;
pub const ORDER_JOLOKIA: i32 = 1650;
pub const ORDER_ENV: i32 = 1700;
pub const ORDER_MOUNT: i32 = 1800;
pub const ORDER_OPENAPI: i32 = 1810;
pub const ORDER_SERVICE: i32 = 2000;
pub const ORDER_EXPOSE: i32 = 2400;

/// Every built-in trait in registration order.
pub fn all() -> Vec<Box<dyn Trait>> {
    vec![
        Box::new(DeploymentTraitHandler),
        Box::new(CronJobTraitHandler),
        Box::new(KnativeServiceTraitHandler),
        Box::new(ContainerTraitHandler),
        Box::new(JolokiaTraitHandler),
        Box::new(EnvTraitHandler),
        Box::new(MountTraitHandler),
        Box::new(OpenApiTraitHandler),
        Box::new(ServiceTraitHandler),
        Box::new(IngressTraitHandler),
        Box::new(RouteTraitHandler),
    ]
}

/// Pod template carrying the selector labels and service account.
fn pod_template(ctx: &TraitContext) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta { labels: Some(ctx.selector_labels()), ..Default::default() }),
        spec: Some(k8s_openapi::api::core::v1::PodSpec {
            service_account_name: ctx.service_account().map(str::to_string),
            ..Default::default()
        }),
    }
}

fn one_of(scope: &str, field: &str, value: &str, allowed: &[&str]) -> ktrait_core::Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ktrait_core::TraitError::config(
            scope,
            format!("{} `{}` is not one of {}", field, value, allowed.join(", ")),
        ))
    }
}
