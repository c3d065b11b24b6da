use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use ktrait_core::{Result, TraitError};
use ktrait_expr::{MountTrait, Traits, MOUNT};
use ktrait_registry::TraitContext;

use super::ORDER_MOUNT;
use crate::mount::{ContentKind, MountResource};
use crate::{Artifact, Trait};

fn resolve(spec: &MountTrait) -> Result<Vec<MountResource>> {
    let mut out = Vec::new();
    for raw in &spec.configs {
        out.push(MountResource::parse_reference(raw, ContentKind::Text)?);
    }
    for raw in &spec.resources {
        out.push(MountResource::parse_reference(raw, ContentKind::Data)?);
    }
    // A configmap:/secret: reference is accepted among volumes as well.
    for raw in &spec.volumes {
        out.push(MountResource::parse(raw, ContentKind::Data)?);
    }
    Ok(out)
}

/// Add `volume` unless an identical one is present. A different volume
/// under the same name is a conflict.
fn add_volume(volumes: &mut Vec<Volume>, volume: Volume) -> Result<()> {
    match volumes.iter().find(|v| v.name == volume.name) {
        Some(existing) if *existing == volume => Ok(()),
        Some(_) => Err(TraitError::config(MOUNT, format!("volume name `{}` is used by different sources", volume.name))),
        None => {
            volumes.push(volume);
            Ok(())
        }
    }
}

fn add_mount(mounts: &mut Vec<VolumeMount>, mount: VolumeMount) {
    if !mounts.iter().any(|m| m.mount_path == mount.mount_path) {
        mounts.push(mount);
    }
}

/// Add volumes to the workload pod and mounts to the application container.
pub(crate) fn mount_all(ctx: &mut TraitContext, resources: &[MountResource]) -> Result<()> {
    let mut outcome = Ok(());
    ctx.visit_pod_specs(|pod| {
        let volumes = pod.volumes.get_or_insert_with(Vec::new);
        for r in resources {
            if let Err(e) = add_volume(volumes, r.volume()) {
                outcome = Err(e);
                return;
            }
        }
        if let Some(container) = pod.containers.first_mut() {
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            for r in resources {
                add_mount(mounts, r.volume_mount());
            }
        }
    });
    outcome
}

/// ConfigMaps, Secrets and claims mounted into the application container.
pub struct MountTraitHandler;

impl Trait for MountTraitHandler {
    fn name(&self) -> &'static str { MOUNT }
    fn order(&self) -> i32 { ORDER_MOUNT }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Container] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let Some(spec) = traits.mount.as_ref() else { return Ok(false) };
        if spec.enabled == Some(false) || spec.is_empty() {
            return Ok(false);
        }
        resolve(spec)?;
        Ok(ctx.app_container().is_some())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let Some(spec) = traits.mount.as_ref() else { return Ok(()) };
        let resources = resolve(spec)?;
        mount_all(ctx, &resources)
    }
}
