#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use ktrait_emit::{render_json, render_yaml, write_configuration_resources, write_manifests};
use ktrait_registry::{Resource, TraitContext};

fn items() -> Vec<Resource> {
    let ctx = TraitContext::new("demo", "1.0");
    vec![
        Resource::Deployment(Deployment { metadata: ctx.object_meta(), ..Default::default() }),
        Resource::Service(Service { metadata: ctx.object_meta(), ..Default::default() }),
    ]
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ktrait-emit-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn yaml_stream_has_one_document_per_item() {
    let yaml = render_yaml(&items()).unwrap();
    assert_eq!(yaml.matches("---\n").count(), 2);
    assert!(yaml.contains("kind: Deployment"));
    assert!(yaml.contains("apiVersion: apps/v1"));
    assert!(yaml.contains("app.kubernetes.io/name: demo"));
}

#[test]
fn json_output_is_a_list() {
    let v: serde_json::Value = serde_json::from_str(&render_json(&items()).unwrap()).unwrap();
    assert_eq!(v["kind"], "List");
    assert_eq!(v["items"][1]["kind"], "Service");
}

#[test]
fn manifests_are_written_per_kind() {
    let dir = scratch("manifests");
    let written = write_manifests(&dir, &items()).unwrap();
    assert_eq!(written.iter().map(|f| (f.kind, f.documents)).collect::<Vec<_>>(), vec![("deployment", 1), ("service", 1)]);
    let service = std::fs::read_to_string(dir.join("service.yml")).unwrap();
    assert!(service.starts_with("---\n"));
    assert!(service.contains("kind: Service"));
    assert!(!service.contains("kind: Deployment"));

    let rewritten = write_manifests(&dir, &items()[..1]).unwrap();
    assert_eq!(rewritten.len(), 1);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn property_lines_are_appended_once() {
    let dir = scratch("props");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("application.properties"), "server.port=9000").unwrap();

    let mut resources = BTreeMap::new();
    resources.insert(
        "application.properties".to_string(),
        vec!["server.port=8080".to_string(), "camel.main.duration-max-idle-seconds=5".to_string()],
    );
    write_configuration_resources(&dir, &resources).unwrap();
    write_configuration_resources(&dir, &resources).unwrap();

    let text = std::fs::read_to_string(dir.join("application.properties")).unwrap();
    assert_eq!(text, "server.port=9000\ncamel.main.duration-max-idle-seconds=5\n");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn configuration_file_names_must_be_plain() {
    let mut resources = BTreeMap::new();
    resources.insert("../escape.properties".to_string(), vec!["a=b".to_string()]);
    assert!(write_configuration_resources(&scratch("escape"), &resources).is_err());
}
