use ktrait_core::Result;
use ktrait_expr::{Traits, OPENAPI};
use ktrait_registry::TraitContext;

use super::mount::mount_all;
use super::ORDER_OPENAPI;
use crate::mount::{ContentKind, MountResource};
use crate::{Artifact, Trait};

fn resolve(configmaps: &[String]) -> Result<Vec<MountResource>> {
    configmaps
        .iter()
        .map(|c| {
            let reference = if c.starts_with("configmap:") { c.clone() } else { format!("configmap:{}", c) };
            MountResource::parse_reference(&reference, ContentKind::Data)
        })
        .collect()
}

/// Mounts ConfigMaps holding OpenAPI documents as resources.
pub struct OpenApiTraitHandler;

impl Trait for OpenApiTraitHandler {
    fn name(&self) -> &'static str { OPENAPI }
    fn order(&self) -> i32 { ORDER_OPENAPI }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Container] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let Some(spec) = traits.openapi.as_ref() else { return Ok(false) };
        if spec.enabled == Some(false) || spec.configmaps.is_empty() {
            return Ok(false);
        }
        resolve(&spec.configmaps)?;
        Ok(ctx.app_container().is_some())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let Some(spec) = traits.openapi.as_ref() else { return Ok(()) };
        let resources = resolve(&spec.configmaps)?;
        mount_all(ctx, &resources)
    }
}
