//! ktrait core types: option values, deployment targets and errors.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Label carrying the application name on every generated manifest.
pub const KUBERNETES_LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label marking the workload as a Camel application.
pub const KUBERNETES_LABEL_RUNTIME: &str = "app.kubernetes.io/runtime";
/// OpenShift console runtime label; selects the Camel icon.
pub const OPENSHIFT_LABEL_RUNTIME: &str = "app.openshift.io/runtime";
pub const RUNTIME_LABEL_VALUE: &str = "camel";

/// A single scalar option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self { Scalar::Str(s.to_string()) }
}

/// Option value held in a trait option bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptValue {
    Scalar(Scalar),
    List(SmallVec<[Scalar; 4]>),
    Map(BTreeMap<String, String>),
}

impl OptValue {
    pub fn str(s: impl Into<String>) -> Self { OptValue::Scalar(Scalar::Str(s.into())) }
    pub fn int(i: i64) -> Self { OptValue::Scalar(Scalar::Int(i)) }
    pub fn bool(b: bool) -> Self { OptValue::Scalar(Scalar::Bool(b)) }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        OptValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self { OptValue::Scalar(s) => Some(s), _ => None }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self { OptValue::List(l) => Some(l.as_slice()), _ => None }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self { OptValue::Map(m) => Some(m), _ => None }
    }
}

/// Options of one trait keyed by camelCase option name.
pub type OptionBag = BTreeMap<String, OptValue>;

/// Deployment target classification used to filter eligible traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitProfile {
    Kubernetes,
    Knative,
    Openshift,
}

impl TraitProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraitProfile::Kubernetes => "kubernetes",
            TraitProfile::Knative => "knative",
            TraitProfile::Openshift => "openshift",
        }
    }
}

impl FromStr for TraitProfile {
    type Err = TraitError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" => Ok(TraitProfile::Kubernetes),
            "knative" => Ok(TraitProfile::Knative),
            "openshift" => Ok(TraitProfile::Openshift),
            other => Err(TraitError::config("profile", format!("unknown trait profile `{}`", other))),
        }
    }
}

impl fmt::Display for TraitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Target cluster flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Kubernetes,
    Openshift,
    Kind,
    Minikube,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Kubernetes => "kubernetes",
            ClusterType::Openshift => "openshift",
            ClusterType::Kind => "kind",
            ClusterType::Minikube => "minikube",
        }
    }

    /// Registry reachable from inside local development clusters.
    pub fn local_registry(&self) -> Option<&'static str> {
        match self {
            ClusterType::Kind => Some("localhost:5001"),
            ClusterType::Minikube => Some("localhost:5000"),
            _ => None,
        }
    }
}

impl FromStr for ClusterType {
    type Err = TraitError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(ClusterType::Kubernetes),
            "openshift" => Ok(ClusterType::Openshift),
            "kind" => Ok(ClusterType::Kind),
            "minikube" => Ok(ClusterType::Minikube),
            other => Err(TraitError::config("cluster-type", format!("unknown cluster type `{}`", other))),
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Application runtime the manifests are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeType {
    #[default]
    Quarkus,
    SpringBoot,
    Main,
}

impl RuntimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeType::Quarkus => "quarkus",
            RuntimeType::SpringBoot => "spring-boot",
            RuntimeType::Main => "main",
        }
    }
}

impl FromStr for RuntimeType {
    type Err = TraitError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quarkus" => Ok(RuntimeType::Quarkus),
            "spring-boot" | "springboot" => Ok(RuntimeType::SpringBoot),
            "main" | "camel-main" => Ok(RuntimeType::Main),
            other => Err(TraitError::config("runtime", format!("unknown runtime `{}`", other))),
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Errors raised while configuring or applying traits.
#[derive(Debug, thiserror::Error)]
pub enum TraitError {
    /// Invalid user supplied configuration; aborts the run.
    #[error("invalid {scope} configuration: {message}")]
    Config { scope: String, message: String },
    #[error("workload {added} rejected: registry already holds a {existing}")]
    DuplicateWorkload { existing: &'static str, added: &'static str },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog: {0}")]
    Catalog(String),
}

impl TraitError {
    pub fn config(scope: impl Into<String>, message: impl Into<String>) -> Self {
        TraitError::Config { scope: scope.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, TraitError>;

/// Reduce `raw` to a DNS-1123 label: lowercase alphanumerics and `-`,
/// at most 63 characters, no leading or trailing dash.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for ch in raw.chars() {
        let c = ch.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    out.truncate(63);
    while out.ends_with('-') { out.pop(); }
    out
}
