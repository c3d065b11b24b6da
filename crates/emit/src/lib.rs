//! ktrait emit: render registry items as YAML/JSON manifests and write them,
//! with the generated property files, to an output directory.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ktrait_registry::{Resource, ResourceKind};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, info};

/// One manifest file written by [`write_manifests`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub kind: &'static str,
    pub documents: usize,
}

fn to_json_items(items: &[Resource]) -> Result<Vec<Json>> {
    items
        .iter()
        .map(|r| r.to_json().with_context(|| format!("serializing {} {}", r.kind().as_str(), r.name())))
        .collect()
}

fn yaml_stream(docs: &[Json]) -> Result<String> {
    let mut out = String::new();
    for doc in docs {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(doc).context("rendering YAML")?);
    }
    Ok(out)
}

/// Multi-document YAML, one document per item.
pub fn render_yaml(items: &[Resource]) -> Result<String> {
    let t0 = std::time::Instant::now();
    let out = yaml_stream(&to_json_items(items)?)?;
    histogram!("emit_render_ms", t0.elapsed().as_secs_f64() * 1000.0);
    Ok(out)
}

/// A `v1/List` holding every item.
pub fn render_json(items: &[Resource]) -> Result<String> {
    let list = serde_json::json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": to_json_items(items)?,
    });
    serde_json::to_string_pretty(&list).context("rendering JSON")
}

/// Write one `<kind>.yml` per manifest kind into `dir`.
pub fn write_manifests(dir: &Path, items: &[Resource]) -> Result<Vec<WrittenFile>> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))?;
    let mut by_kind: BTreeMap<ResourceKind, Vec<Json>> = BTreeMap::new();
    for (item, json) in items.iter().zip(to_json_items(items)?) {
        by_kind.entry(item.kind()).or_default().push(json);
    }

    let mut written = Vec::with_capacity(by_kind.len());
    for (kind, docs) in by_kind {
        let path = dir.join(format!("{}.yml", kind.as_str()));
        fs::write(&path, yaml_stream(&docs)?).with_context(|| format!("writing {}", path.display()))?;
        counter!("manifest_files_written_total", 1u64);
        info!(path = %path.display(), documents = docs.len(), "emit: manifest written");
        written.push(WrittenFile { path, kind: kind.as_str(), documents: docs.len() });
    }
    Ok(written)
}

/// Append generated property lines to `dir/<file>`, skipping lines whose key
/// the file already sets.
pub fn write_configuration_resources(dir: &Path, resources: &BTreeMap<String, Vec<String>>) -> Result<Vec<PathBuf>> {
    let mut touched = Vec::new();
    for (file, lines) in resources {
        if file.contains('/') || file.contains("..") {
            return Err(anyhow!("configuration resource `{}` must be a plain file name", file));
        }
        let path = dir.join(file);
        let existing = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let present: Vec<&str> = existing
            .lines()
            .filter_map(|l| l.split_once('=').map(|(k, _)| k.trim()))
            .collect();
        let mut out = existing.clone();
        let mut added = 0usize;
        for line in lines {
            let key = line.split_once('=').map(|(k, _)| k.trim()).unwrap_or(line.as_str());
            if present.contains(&key) {
                debug!(path = %path.display(), key, "emit: property already set; keeping file value");
                continue;
            }
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(line);
            out.push('\n');
            added += 1;
        }
        if added > 0 {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), added, "emit: configuration resource updated");
            touched.push(path);
        }
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_stream_separates_documents() {
        let docs = vec![serde_json::json!({ "kind": "Service" }), serde_json::json!({ "kind": "Ingress" })];
        assert_eq!(yaml_stream(&docs).unwrap(), "---\nkind: Service\n---\nkind: Ingress\n");
        assert_eq!(yaml_stream(&[]).unwrap(), "");
    }
}
