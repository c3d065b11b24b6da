//! Mount expressions: `configmap:name[/key][@path]`, `secret:name[/key][@path]`
//! and the volume form `claim:path`.

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, PersistentVolumeClaimVolumeSource, SecretVolumeSource, Volume, VolumeMount,
};
use ktrait_core::{sanitize_name, Result, TraitError};
use once_cell::sync::Lazy;
use regex::Regex;

pub const RESOURCES_DIR: &str = "/etc/camel/resources.d";
pub const CONF_DIR: &str = "/etc/camel/conf.d";

static REFERENCE: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(?P<name>[A-Za-z0-9._-]+)(?:/(?P<key>[A-Za-z0-9._-]+))?(?:@(?P<path>/[^@]*))?$"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
}

impl StorageKind {
    fn dir(&self) -> &'static str {
        match self {
            StorageKind::ConfigMap => "_configmaps",
            StorageKind::Secret => "_secrets",
            StorageKind::PersistentVolumeClaim => "_volumes",
        }
    }
}

/// What the mounted content is; picks the default base directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Data,
    Text,
}

impl ContentKind {
    pub fn base_dir(&self) -> &'static str {
        match self {
            ContentKind::Data => RESOURCES_DIR,
            ContentKind::Text => CONF_DIR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountResource {
    pub storage: StorageKind,
    pub content: ContentKind,
    pub name: String,
    pub key: Option<String>,
    pub destination: Option<String>,
}

fn invalid(raw: &str, why: &str) -> TraitError {
    TraitError::config("mount", format!("`{}`: {}", raw, why))
}

impl MountResource {
    /// Parse a `configmap:` or `secret:` reference. Other prefixes are
    /// rejected.
    pub fn parse_reference(raw: &str, content: ContentKind) -> Result<Self> {
        let (storage, rest) = if let Some(rest) = raw.strip_prefix("configmap:") {
            (StorageKind::ConfigMap, rest)
        } else if let Some(rest) = raw.strip_prefix("secret:") {
            (StorageKind::Secret, rest)
        } else {
            return Err(invalid(raw, "unsupported resource, expected configmap:<name> or secret:<name>"));
        };
        let pattern = REFERENCE.as_ref().map_err(|e| TraitError::config("mount", e.to_string()))?;
        let caps = pattern
            .captures(rest)
            .ok_or_else(|| invalid(raw, "expected <name>[/<key>][@<path>]"))?;
        Ok(Self {
            storage,
            content,
            name: caps["name"].to_string(),
            key: caps.name("key").map(|m| m.as_str().to_string()),
            destination: caps.name("path").map(|m| m.as_str().to_string()),
        })
    }

    /// Parse `claim:path`.
    pub fn parse_volume(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        match parts.as_slice() {
            [name, path] if !name.is_empty() && path.starts_with('/') => Ok(Self {
                storage: StorageKind::PersistentVolumeClaim,
                content: ContentKind::Data,
                name: name.to_string(),
                key: None,
                destination: Some(path.to_string()),
            }),
            _ => Err(invalid(raw, "volume must be <claim>:<absolute path>")),
        }
    }

    /// Either form, dispatching on the prefix.
    pub fn parse(raw: &str, content: ContentKind) -> Result<Self> {
        if raw.starts_with("configmap:") || raw.starts_with("secret:") {
            Self::parse_reference(raw, content)
        } else {
            Self::parse_volume(raw)
        }
    }

    fn resource_dir(&self) -> String {
        format!("{}/{}/{}", self.content.base_dir(), self.storage.dir(), self.name)
    }

    pub fn mount_path(&self) -> String {
        match (&self.destination, &self.key) {
            (Some(dest), _) => dest.clone(),
            (None, Some(key)) => format!("{}/{}", self.resource_dir(), key),
            (None, None) => self.resource_dir(),
        }
    }

    /// Keyed mounts expose a single entry of the resource.
    pub fn sub_path(&self) -> Option<String> { self.key.clone() }

    /// Shared by every mount of the same resource.
    pub fn volume_name(&self) -> String { sanitize_name(&self.name) }

    pub fn volume(&self) -> Volume {
        let mut volume = Volume { name: self.volume_name(), ..Default::default() };
        match self.storage {
            StorageKind::ConfigMap => {
                volume.config_map = Some(ConfigMapVolumeSource { name: Some(self.name.clone()), ..Default::default() });
            }
            StorageKind::Secret => {
                volume.secret = Some(SecretVolumeSource { secret_name: Some(self.name.clone()), ..Default::default() });
            }
            StorageKind::PersistentVolumeClaim => {
                volume.persistent_volume_claim =
                    Some(PersistentVolumeClaimVolumeSource { claim_name: self.name.clone(), ..Default::default() });
            }
        }
        volume
    }

    pub fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.volume_name(),
            mount_path: self.mount_path(),
            sub_path: self.sub_path(),
            read_only: (self.storage != StorageKind::PersistentVolumeClaim).then_some(true),
            ..Default::default()
        }
    }
}
