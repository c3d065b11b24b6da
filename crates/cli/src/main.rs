use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use ktrait_core::{
    sanitize_name, ClusterType, RuntimeType, TraitProfile, KUBERNETES_LABEL_RUNTIME, OPENSHIFT_LABEL_RUNTIME,
    RUNTIME_LABEL_VALUE,
};
use ktrait_expr::{
    extract_traits_from_annotations, merge_traits, name_from_image, parse_traits, read_properties_traits,
    resolve_image_group, resolve_image_registry, version_from_image, Traits, ANNOTATION_TRAIT_PREFIX,
};
use ktrait_registry::{SourceMetadata, TraitContext};
use ktrait_traits::TraitCatalog;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use tracing::{info, warn};

const DEFAULT_VERSION: &str = "1.0-SNAPSHOT";

#[derive(Parser, Debug)]
#[command(name = "ktraitctl", version, about = "Compose trait expressions into Kubernetes manifests")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Print Prometheus metrics of the run to stderr
    #[arg(long = "metrics", global = true, action = ArgAction::SetTrue)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Yaml, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the trait catalog and emit manifests
    Export(ExportArgs),
    /// Print the merged trait configuration
    Parse {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// List the trait catalog in execution order
    Traits {
        /// Only traits eligible for this profile
        #[arg(long = "trait-profile")]
        profile: Option<String>,
    },
}

/// Where trait expressions come from, highest priority first.
#[derive(Args, Debug, Default)]
struct SourceArgs {
    /// Trait expression <trait>.<key>=<value> (repeatable)
    #[arg(short = 't', long = "trait")]
    traits: Vec<String>,

    /// Annotation key=value; trait.camel.apache.org/ annotations carry traits
    #[arg(long = "annotation")]
    annotations: Vec<String>,

    /// Directory holding application[-<profile>].properties
    #[arg(long = "properties-dir")]
    properties_dir: Option<PathBuf>,

    /// Application profile selecting application-<profile>.properties
    #[arg(long = "profile")]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Application name (defaults to the image name)
    #[arg(long = "name")]
    name: Option<String>,

    /// Application version (defaults to the image tag)
    #[arg(long = "version")]
    version: Option<String>,

    /// Container image
    #[arg(long = "image")]
    image: Option<String>,

    /// Image registry host, or kind/minikube for their local registries
    #[arg(long = "image-registry")]
    image_registry: Option<String>,

    /// Image group (organization)
    #[arg(long = "image-group")]
    image_group: Option<String>,

    /// Label key=value added to every manifest (repeatable)
    #[arg(long = "label", value_parser = parse_key_value)]
    labels: Vec<(String, String)>,

    /// Environment variable NAME=value (repeatable)
    #[arg(long = "env")]
    env: Vec<String>,

    /// configmap:/secret: reference mounted as configuration (repeatable)
    #[arg(long = "config")]
    configs: Vec<String>,

    /// configmap:/secret: reference mounted as resource (repeatable)
    #[arg(long = "resource")]
    resources: Vec<String>,

    /// Persistent volume claim:path (repeatable)
    #[arg(long = "volume")]
    volumes: Vec<String>,

    /// configmap:<name>[/<key>] holding an OpenAPI document (repeatable)
    #[arg(long = "open-api")]
    open_apis: Vec<String>,

    /// Service to bind to, as [[apigroup/]version:]kind:[namespace/]name (repeatable)
    #[arg(long = "connect")]
    connects: Vec<String>,

    /// Port of the management server serving health probes
    #[arg(long = "management-port", env = "KTRAIT_MANAGEMENT_PORT")]
    management_port: Option<i32>,

    #[arg(long = "service-account")]
    service_account: Option<String>,

    /// kubernetes, openshift, kind or minikube
    #[arg(long = "cluster-type")]
    cluster_type: Option<String>,

    /// kubernetes, knative or openshift
    #[arg(long = "trait-profile")]
    trait_profile: Option<String>,

    /// quarkus, spring-boot or main
    #[arg(long = "runtime", default_value = "quarkus")]
    runtime: String,

    /// The application serves HTTP
    #[arg(long = "exposes-http", action = ArgAction::SetTrue)]
    exposes_http: bool,

    /// Write <kind>.yml files and property files here instead of stdout
    #[arg(long = "output-dir", env = "KTRAIT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got `{}`", s))
}

/// Runtime labels plus the user's `--label` pairs.
fn add_labels(ctx: &mut TraitContext, labels: &[(String, String)]) {
    ctx.add_label(KUBERNETES_LABEL_RUNTIME, RUNTIME_LABEL_VALUE);
    for (k, v) in labels {
        ctx.add_label(k, v);
    }
    if ctx.cluster_type() == Some(ClusterType::Openshift) {
        ctx.add_label(OPENSHIFT_LABEL_RUNTIME, RUNTIME_LABEL_VALUE);
    }
}

fn init_tracing() {
    let env = std::env::var("KTRAIT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(enabled: bool) -> Option<PrometheusHandle> {
    if !enabled {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder");
            None
        }
    }
}

fn parse_opt<T: FromStr>(raw: Option<&str>) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(T::from_str).transpose().map_err(anyhow::Error::from)
}

/// Merge every expression source: CLI > annotations > profile properties >
/// application properties.
fn collect_expressions(sources: &SourceArgs) -> Result<Vec<String>> {
    let annotations = extract_traits_from_annotations(&sources.annotations);
    let mut profile_props = Vec::new();
    let mut app_props = Vec::new();
    if let Some(dir) = sources.properties_dir.as_deref() {
        if let Some(profile) = sources.profile.as_deref() {
            profile_props = read_properties(dir, &format!("application-{}.properties", profile))?;
        }
        app_props = read_properties(dir, "application.properties")?;
    }
    Ok(merge_traits(&[&sources.traits, &annotations, &profile_props, &app_props]))
}

fn read_properties(dir: &Path, file: &str) -> Result<Vec<String>> {
    let path = dir.join(file);
    let exprs = read_properties_traits(&path).with_context(|| format!("loading traits from {}", path.display()))?;
    if let Some(exprs) = &exprs {
        info!(path = %path.display(), count = exprs.len(), "properties: trait expressions loaded");
    }
    Ok(exprs.unwrap_or_default())
}

fn print_structured<T: Serialize>(value: &T, output: Output) -> Result<()> {
    match output {
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn run_export(args: ExportArgs, output: Output) -> Result<()> {
    let cluster: Option<ClusterType> = parse_opt(args.cluster_type.as_deref())?;
    let profile: Option<TraitProfile> = parse_opt(args.trait_profile.as_deref())?;
    let runtime = RuntimeType::from_str(&args.runtime)?;

    let raw_name = args
        .name
        .clone()
        .or_else(|| args.image.as_deref().map(name_from_image))
        .ok_or_else(|| anyhow!("--name or --image is required"))?;
    let name = sanitize_name(&raw_name);
    if name.is_empty() {
        return Err(anyhow!("application name `{}` has no usable characters", raw_name));
    }
    let version = args
        .version
        .clone()
        .or_else(|| args.image.as_deref().and_then(version_from_image))
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    let expressions = collect_expressions(&args.sources)?;
    let mut traits: Traits = parse_traits(&expressions)?;
    traits.configure_env_vars(&args.env);
    traits.configure_connects(&args.connects);
    traits.configure_mount(&args.configs, &args.resources, &args.volumes);
    for spec in &args.open_apis {
        if !traits.configure_open_api_spec(spec) {
            warn!(spec = %spec, "open-api: only configmap: references can be mounted; ignoring");
        }
    }
    let registry = resolve_image_registry(args.image.as_deref(), args.image_registry.as_deref(), cluster);
    let group = resolve_image_group(args.image.as_deref(), args.image_group.as_deref());
    traits.configure_container_image(args.image.as_deref(), registry.as_deref(), group.as_deref(), &name, &version);

    let mut ctx = TraitContext::new(name, version)
        .with_profile(profile)
        .with_cluster_type(cluster)
        .with_runtime(runtime)
        .with_service_account(args.service_account.clone())
        .with_management_port(args.management_port)
        .with_source(SourceMetadata { exposes_http: args.exposes_http });
    add_labels(&mut ctx, &args.labels);
    for raw in args.sources.annotations.iter().filter(|a| !a.starts_with(ANNOTATION_TRAIT_PREFIX)) {
        let (k, v) = parse_key_value(raw).map_err(|e| anyhow!(e))?;
        ctx.add_annotation(k, v);
    }

    let catalog = TraitCatalog::new()?;
    let report = catalog.apply(&traits, &mut ctx)?;
    let items = ctx.build_items();

    match &args.output_dir {
        Some(dir) => {
            let written = ktrait_emit::write_manifests(dir, &items)?;
            let props = ktrait_emit::write_configuration_resources(dir, ctx.configuration_resources())?;
            match output {
                Output::Human => {
                    for f in &written {
                        println!("{} • {} document(s)", f.path.display(), f.documents);
                    }
                    for p in &props {
                        println!("{} • properties", p.display());
                    }
                }
                _ => print_structured(&written, output)?,
            }
        }
        None => match output {
            Output::Json => println!("{}", ktrait_emit::render_json(&items)?),
            Output::Yaml => print!("{}", ktrait_emit::render_yaml(&items)?),
            Output::Human => {
                print!("{}", ktrait_emit::render_yaml(&items)?);
                for (file, lines) in ctx.configuration_resources() {
                    eprintln!("# {}", file);
                    for line in lines {
                        eprintln!("{}", line);
                    }
                }
            }
        },
    }
    info!(applied = ?report.applied, addons = ?report.addons, resources = items.len(), "export done");
    Ok(())
}

#[derive(Serialize)]
struct CatalogRow {
    name: &'static str,
    order: i32,
    produces: Vec<&'static str>,
    requires: Vec<&'static str>,
}

fn run_traits(profile: Option<String>, output: Output) -> Result<()> {
    let profile: Option<TraitProfile> = parse_opt(profile.as_deref())?;
    let catalog = TraitCatalog::new()?;
    let selected = catalog.traits_for_profile(profile);
    let rows: Vec<CatalogRow> = selected
        .iter()
        .map(|t| CatalogRow {
            name: t.name(),
            order: t.order(),
            produces: t.produces().iter().map(|a| a.as_str()).collect(),
            requires: t.requires().iter().map(|a| a.as_str()).collect(),
        })
        .collect();
    match output {
        Output::Human => {
            for r in &rows {
                println!("{:>5} {:<16} produces [{}] requires [{}]", r.order, r.name, r.produces.join(","), r.requires.join(","));
            }
        }
        _ => print_structured(&rows, output)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let metrics = init_metrics(cli.metrics);

    match cli.command {
        Commands::Export(args) => run_export(args, cli.output)?,
        Commands::Parse { sources } => {
            let expressions = collect_expressions(&sources)?;
            match cli.output {
                Output::Human => expressions.iter().for_each(|e| println!("{}", e)),
                _ => print_structured(&parse_traits(&expressions)?, cli.output)?,
            }
        }
        Commands::Traits { profile } => run_traits(profile, cli.output)?,
    }

    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs_split_on_first_equals() {
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn runtime_labels_mark_camel_workloads() {
        let mut ctx = TraitContext::new("demo", "1.0").with_runtime(RuntimeType::SpringBoot);
        add_labels(&mut ctx, &[("team".to_string(), "a".to_string())]);
        assert_eq!(ctx.labels().len(), 2);
        assert_eq!(ctx.labels()[KUBERNETES_LABEL_RUNTIME], "camel");
        assert!(!ctx.labels().contains_key(OPENSHIFT_LABEL_RUNTIME));

        let mut ctx = TraitContext::new("demo", "1.0").with_cluster_type(Some(ClusterType::Openshift));
        add_labels(&mut ctx, &[]);
        assert_eq!(ctx.labels()[OPENSHIFT_LABEL_RUNTIME], "camel");
    }

    #[test]
    fn sources_merge_by_precedence() {
        let dir = std::env::temp_dir().join(format!("ktraitctl-sources-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("application.properties"),
            "camel.jbang.trait.container.port=7000\ncamel.jbang.trait.service.type=NodePort\ncamel.jbang.trait.ingress.host=app\n",
        )
        .unwrap();
        std::fs::write(dir.join("application-dev.properties"), "camel.jbang.trait.service.type=LoadBalancer\n").unwrap();

        let sources = SourceArgs {
            traits: vec!["container.port=8080".to_string()],
            annotations: vec!["trait.camel.apache.org/ingress.host=cli".to_string(), "team=a".to_string()],
            properties_dir: Some(dir.clone()),
            profile: Some("dev".to_string()),
        };
        let merged = collect_expressions(&sources).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(merged, vec!["container.port=8080", "ingress.host=cli", "service.type=LoadBalancer"]);
    }

    #[test]
    fn cli_parses_export_flags() {
        let cli = Cli::try_parse_from([
            "ktraitctl",
            "export",
            "--name",
            "demo",
            "-t",
            "container.port=8080",
            "--label",
            "team=a",
            "--connect",
            "apps/v1:Deployment:orders",
            "--management-port",
            "9000",
            "-o",
            "yaml",
        ])
        .unwrap();
        assert_eq!(cli.output, Output::Yaml);
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.name.as_deref(), Some("demo"));
                assert_eq!(args.sources.traits, vec!["container.port=8080"]);
                assert_eq!(args.labels, vec![("team".to_string(), "a".to_string())]);
                assert_eq!(args.connects, vec!["apps/v1:Deployment:orders"]);
                assert_eq!(args.management_port, Some(9000));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
