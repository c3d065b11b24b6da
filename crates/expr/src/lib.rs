//! ktrait expressions: parse `trait.key=value` strings into option bags,
//! merge expression sources by precedence and lift the result into the typed
//! [`Traits`] model.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use ktrait_core::{ClusterType, OptValue, OptionBag, Scalar};
use smallvec::smallvec;
use tracing::debug;

pub mod lenient;
pub mod model;

pub use model::*;

/// Annotation prefix marking a trait expression on a resource.
pub const ANNOTATION_TRAIT_PREFIX: &str = "trait.camel.apache.org/";
/// Property key prefix marking a trait expression in a properties file.
pub const PROPERTY_TRAIT_PREFIX: &str = "camel.jbang.trait.";

#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("malformed trait expression `{0}` (expected <trait>.<key>=<value>)")]
    Malformed(String),
    #[error("option `{trait_name}.{key}` expects key=value pairs, got `{value}`")]
    MalformedPair { trait_name: String, key: String, value: String },
    #[error("too many trait expressions ({count} > {max})")]
    TooMany { count: usize, max: usize },
    #[error("invalid options for trait `{trait_name}`: {source}")]
    Model {
        trait_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExprError>;

fn max_expressions() -> usize {
    std::env::var("KTRAIT_MAX_EXPRESSIONS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
}

/// `tls-termination` -> `tlsTermination`. Keys without dashes pass through.
pub fn kebab_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '-' {
            upper = !out.is_empty();
            continue;
        }
        if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Split `trait.key=value` into its three parts. The trait separator must
/// come before the first `=`, so dots inside values never split the name.
fn split_expression(expr: &str) -> Result<(&str, &str, &str)> {
    let (lhs, value) = expr.split_once('=').ok_or_else(|| ExprError::Malformed(expr.to_string()))?;
    let (trait_name, key) = lhs.split_once('.').ok_or_else(|| ExprError::Malformed(expr.to_string()))?;
    let (trait_name, key) = (trait_name.trim(), key.trim());
    if trait_name.is_empty() || key.is_empty() {
        return Err(ExprError::Malformed(expr.to_string()));
    }
    Ok((trait_name, key, value))
}

/// Normalized `<trait>.<camelKey>` prefix used for cross-source precedence.
fn expression_prefix(expr: &str) -> String {
    match split_expression(expr) {
        Ok((t, k, _)) => format!("{}.{}", t, kebab_to_camel(k)),
        Err(_) => expr.split_once('=').map(|(k, _)| k).unwrap_or(expr).trim().to_string(),
    }
}

fn strip_quotes(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    let quoted = (raw.starts_with('"') && raw.ends_with('"')) || (raw.starts_with('\'') && raw.ends_with('\''));
    quoted.then(|| &raw[1..raw.len() - 1])
}

fn resolve_scalar(raw: &str) -> Scalar {
    if let Some(inner) = strip_quotes(raw) {
        return Scalar::Str(inner.to_string());
    }
    match raw.parse::<i64>() {
        Ok(i) => Scalar::Int(i),
        Err(_) => Scalar::Str(raw.to_string()),
    }
}

/// Split on `,`, dropping trailing empty segments so `A=1,` yields one item.
fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    let mut parts: Vec<&str> = raw.split(',').collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts.into_iter()
}

/// Resolve the raw text of an option into a typed value.
pub fn resolve_value(key: &str, raw: &str) -> OptValue {
    if key == "enabled" || key == "verbose" {
        return OptValue::bool(raw.trim().eq_ignore_ascii_case("true"));
    }
    if raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        if inner.contains(',') {
            return OptValue::List(split_list(inner).map(Scalar::from).collect());
        }
        return OptValue::List(smallvec![Scalar::from(inner)]);
    }
    if raw.contains(',') {
        return OptValue::List(split_list(raw).map(resolve_scalar).collect());
    }
    OptValue::Scalar(resolve_scalar(raw))
}

fn insert_pair(map: &mut BTreeMap<String, String>, pair: &Scalar, trait_name: &str, key: &str) -> Result<()> {
    let text = pair.to_string();
    let (k, v) = text.split_once('=').ok_or_else(|| ExprError::MalformedPair {
        trait_name: trait_name.to_string(),
        key: key.to_string(),
        value: text.clone(),
    })?;
    map.insert(k.to_string(), v.to_string());
    Ok(())
}

/// Combine a repeated option. Annotation-like keys (ending in `annotations`)
/// turn repeated scalars into a `key=value` map, every other key into a list.
pub fn accumulate(trait_name: &str, key: &str, existing: OptValue, new: OptValue) -> Result<OptValue> {
    let annotations = key.ends_with("annotations");
    Ok(match (existing, new) {
        (OptValue::List(mut a), OptValue::List(b)) => {
            a.extend(b);
            OptValue::List(a)
        }
        (OptValue::List(mut a), OptValue::Scalar(s)) => {
            a.push(s);
            OptValue::List(a)
        }
        (OptValue::List(mut a), OptValue::Map(m)) => {
            a.extend(m.into_iter().map(|(k, v)| Scalar::Str(format!("{}={}", k, v))));
            OptValue::List(a)
        }
        (OptValue::Map(mut m), OptValue::Map(b)) => {
            m.extend(b);
            OptValue::Map(m)
        }
        (OptValue::Map(mut m), OptValue::Scalar(s)) => {
            insert_pair(&mut m, &s, trait_name, key)?;
            OptValue::Map(m)
        }
        (OptValue::Map(mut m), OptValue::List(l)) => {
            for s in l.iter() {
                insert_pair(&mut m, s, trait_name, key)?;
            }
            OptValue::Map(m)
        }
        (OptValue::Scalar(a), OptValue::Scalar(b)) if annotations => {
            let mut m = BTreeMap::new();
            insert_pair(&mut m, &a, trait_name, key)?;
            insert_pair(&mut m, &b, trait_name, key)?;
            OptValue::Map(m)
        }
        (OptValue::Scalar(a), OptValue::Scalar(b)) => OptValue::List(smallvec![a, b]),
        (OptValue::Scalar(a), OptValue::List(l)) if annotations => {
            let mut m = BTreeMap::new();
            insert_pair(&mut m, &a, trait_name, key)?;
            for s in l.iter() {
                insert_pair(&mut m, s, trait_name, key)?;
            }
            OptValue::Map(m)
        }
        (OptValue::Scalar(a), OptValue::List(l)) => {
            let mut out = smallvec![a];
            out.extend(l);
            OptValue::List(out)
        }
        (OptValue::Scalar(a), OptValue::Map(b)) => {
            let mut m = BTreeMap::new();
            insert_pair(&mut m, &a, trait_name, key)?;
            m.extend(b);
            OptValue::Map(m)
        }
    })
}

/// Parse expressions into raw option bags keyed by trait name.
pub fn parse_expressions<S: AsRef<str>>(exprs: &[S]) -> Result<BTreeMap<String, OptionBag>> {
    let max = max_expressions();
    if exprs.len() > max {
        return Err(ExprError::TooMany { count: exprs.len(), max });
    }
    let mut out: BTreeMap<String, OptionBag> = BTreeMap::new();
    for expr in exprs {
        let expr = expr.as_ref();
        let (trait_name, key, raw) = split_expression(expr)?;
        let key = kebab_to_camel(key);
        let value = resolve_value(&key, raw);
        let bag = out.entry(trait_name.to_string()).or_default();
        let merged = match bag.remove(&key) {
            Some(existing) => accumulate(trait_name, &key, existing, value)?,
            None => value,
        };
        bag.insert(key, merged);
    }
    Ok(out)
}

/// Parse expressions straight into the typed model.
pub fn parse_traits<S: AsRef<str>>(exprs: &[S]) -> Result<Traits> {
    Traits::from_bags(parse_expressions(exprs)?)
}

/// Merge expression sources ordered by descending priority. A
/// `<trait>.<key>` defined by a higher source shadows every expression for
/// that key in lower sources; repetitions inside the winning source are kept.
pub fn merge_traits(sources: &[&[String]]) -> Vec<String> {
    let mut existing: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for source in sources {
        let mut keys_of_source = HashSet::new();
        for expr in source.iter() {
            let prefix = expression_prefix(expr);
            if !existing.contains(&prefix) {
                merged.push(expr.clone());
                keys_of_source.insert(prefix);
            } else {
                debug!(expr = %expr, "trait expression shadowed by higher priority source");
            }
        }
        existing.extend(keys_of_source);
    }
    merged
}

/// `trait.camel.apache.org/container.port=8080` -> `container.port=8080`.
pub fn extract_traits_from_annotations<S: AsRef<str>>(annotations: &[S]) -> Vec<String> {
    annotations
        .iter()
        .filter_map(|a| a.as_ref().trim().strip_prefix(ANNOTATION_TRAIT_PREFIX))
        .filter(|rest| rest.contains('='))
        .map(|rest| rest.to_string())
        .collect()
}

/// `camel.jbang.trait.container.port = 8080` -> `container.port=8080`.
pub fn extract_traits_from_properties(props: &[(String, String)]) -> Vec<String> {
    props
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(PROPERTY_TRAIT_PREFIX).map(|t| format!("{}={}", t, v)))
        .collect()
}

/// Parse `key=value` / `key: value` lines of a properties file. Comment lines
/// start with `#` or `!`; a trailing backslash continues the value.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pending = String::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if pending.is_empty() && (trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!')) {
            continue;
        }
        if let Some(cont) = trimmed.strip_suffix('\\') {
            pending.push_str(cont);
            continue;
        }
        pending.push_str(trimmed);
        let entry = std::mem::take(&mut pending);
        let sep = entry.find(|c: char| c == '=' || c == ':');
        let (k, v) = match sep {
            Some(i) => (&entry[..i], &entry[i + 1..]),
            None => (entry.as_str(), ""),
        };
        out.push((k.trim().to_string(), v.trim().to_string()));
    }
    out
}

/// Read trait expressions from a properties file; `Ok(None)` when absent.
pub fn read_properties_traits(path: &Path) -> Result<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|source| ExprError::Io { path: path.display().to_string(), source })?;
    Ok(Some(extract_traits_from_properties(&parse_properties(&text))))
}

/// Registry host for pushed images: explicit image wins, then the
/// `--image-registry` alias, then the local registry of dev clusters.
pub fn resolve_image_registry(image: Option<&str>, image_registry: Option<&str>, cluster: Option<ClusterType>) -> Option<String> {
    if let Some(image) = image {
        let parts: Vec<&str> = image.split('/').collect();
        if parts.len() == 3 {
            return Some(parts[0].to_string());
        }
    }
    if let Some(reg) = image_registry {
        return Some(match reg {
            "kind" | "kind-registry" => "localhost:5001".to_string(),
            "minikube" | "minikube-registry" => "localhost:5000".to_string(),
            other => other.to_string(),
        });
    }
    cluster.and_then(|c| c.local_registry()).map(|s| s.to_string())
}

pub fn resolve_image_group(image: Option<&str>, image_group: Option<&str>) -> Option<String> {
    if let Some(image) = image {
        let parts: Vec<&str> = image.split('/').collect();
        match parts.len() {
            3 => return Some(parts[1].to_string()),
            n if n > 1 => return Some(parts[0].to_string()),
            _ => {}
        }
    }
    image_group.map(|s| s.to_string())
}

/// `quay.io/camel/demo-app:1.0` -> `demo-app`.
pub fn name_from_image(image: &str) -> String {
    let repo = image.rsplit('/').next().unwrap_or(image);
    let repo = repo.split_once(':').map(|(r, _)| r).unwrap_or(repo);
    ktrait_core::sanitize_name(repo)
}

/// `quay.io/camel/demo-app:1.0` -> `Some("1.0")`.
pub fn version_from_image(image: &str) -> Option<String> {
    let last = image.rsplit('/').next().unwrap_or(image);
    last.split_once(':').map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_keys_become_camel_case() {
        assert_eq!(kebab_to_camel("tls-termination"), "tlsTermination");
        assert_eq!(kebab_to_camel("image-pull-policy"), "imagePullPolicy");
        assert_eq!(kebab_to_camel("pathType"), "pathType");
        assert_eq!(kebab_to_camel("port"), "port");
    }

    #[test]
    fn values_resolve_by_priority() {
        assert_eq!(resolve_value("enabled", "TRUE"), OptValue::bool(true));
        assert_eq!(resolve_value("verbose", "nope"), OptValue::bool(false));
        assert_eq!(resolve_value("x", "[a,b]"), OptValue::list(["a", "b"]));
        assert_eq!(resolve_value("x", "[solo]"), OptValue::list(["solo"]));
        assert_eq!(resolve_value("x", "8080"), OptValue::int(8080));
        assert_eq!(resolve_value("x", "0.5"), OptValue::str("0.5"));
        assert_eq!(resolve_value("x", "\"8080\""), OptValue::str("8080"));
        assert_eq!(resolve_value("x", "'edge'"), OptValue::str("edge"));
        assert_eq!(
            resolve_value("x", "a,2"),
            OptValue::List(smallvec![Scalar::Str("a".into()), Scalar::Int(2)])
        );
    }

    #[test]
    fn bracket_elements_are_not_coerced() {
        assert_eq!(resolve_value("x", "[1,2]"), OptValue::list(["1", "2"]));
    }

    #[test]
    fn trailing_commas_do_not_add_empty_items() {
        assert_eq!(resolve_value("vars", "A=1,"), OptValue::list(["A=1"]));
        assert_eq!(resolve_value("vars", "A=1,B=2,,"), OptValue::list(["A=1", "B=2"]));
        assert_eq!(resolve_value("x", "[a,b,]"), OptValue::list(["a", "b"]));
        assert_eq!(resolve_value("x", ",a"), OptValue::list(["", "a"]));
        let traits = parse_traits(&["env.vars=A=1,"]).unwrap();
        assert_eq!(traits.env.unwrap().vars, vec!["A=1"]);
    }

    #[test]
    fn dots_in_values_do_not_split_trait_names() {
        assert!(split_expression("foo=bar.baz").is_err());
        let (t, k, v) = split_expression("ingress.annotations=nginx.ingress.kubernetes.io/use-regex=true").unwrap();
        assert_eq!((t, k, v), ("ingress", "annotations", "nginx.ingress.kubernetes.io/use-regex=true"));
    }

    #[test]
    fn repeated_scalars_accumulate_into_lists_or_maps() {
        let bags = parse_expressions(&["env.vars=X", "env.vars=Y"]).unwrap();
        assert_eq!(bags["env"]["vars"], OptValue::list(["X", "Y"]));

        let bags = parse_expressions(&["a.annotations=k1=v1", "a.annotations=k2=v2"]).unwrap();
        let m = bags["a"]["annotations"].as_map().unwrap();
        assert_eq!(m.get("k1").map(String::as_str), Some("v1"));
        assert_eq!(m.get("k2").map(String::as_str), Some("v2"));

        let bags = parse_expressions(&["a.vars=[x,y]", "a.vars=z", "a.vars=[w]"]).unwrap();
        assert_eq!(bags["a"]["vars"], OptValue::list(["x", "y", "z", "w"]));
    }

    #[test]
    fn map_accumulation_requires_pairs() {
        let err = parse_expressions(&["a.annotations=k1=v1", "a.annotations=broken"]).unwrap_err();
        assert!(matches!(err, ExprError::MalformedPair { .. }), "{err}");
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(parse_expressions(&["container"]).is_err());
        assert!(parse_expressions(&["container.port"]).is_err());
        assert!(parse_expressions(&[".port=1"]).is_err());
    }

    #[test]
    fn properties_are_parsed_and_rewritten() {
        let text = "# comment\ncamel.jbang.trait.container.port = 8080\nfoo: bar\ncamel.jbang.trait.env.vars=A=1,\\\n  B=2\n";
        let props = parse_properties(text);
        assert_eq!(props[0], ("camel.jbang.trait.container.port".into(), "8080".into()));
        assert_eq!(props[1], ("foo".into(), "bar".into()));
        let traits = extract_traits_from_properties(&props);
        assert_eq!(traits, vec!["container.port=8080".to_string(), "env.vars=A=1,B=2".to_string()]);
    }

    #[test]
    fn annotations_are_rewritten() {
        let out = extract_traits_from_annotations(&[
            "trait.camel.apache.org/service.type=NodePort",
            "foo=bar",
        ]);
        assert_eq!(out, vec!["service.type=NodePort".to_string()]);
    }

    #[test]
    fn image_helpers_split_references() {
        assert_eq!(name_from_image("quay.io/camel/demo-app:1.0"), "demo-app");
        assert_eq!(version_from_image("quay.io/camel/demo-app:1.0").as_deref(), Some("1.0"));
        assert_eq!(resolve_image_registry(Some("quay.io/camel/demo-app:1.0"), None, None).as_deref(), Some("quay.io"));
        assert_eq!(resolve_image_group(Some("quay.io/camel/demo-app:1.0"), None).as_deref(), Some("camel"));
        assert_eq!(resolve_image_registry(None, Some("kind"), None).as_deref(), Some("localhost:5001"));
        assert_eq!(resolve_image_registry(None, None, Some(ClusterType::Minikube)).as_deref(), Some("localhost:5000"));
        assert_eq!(resolve_image_registry(None, None, None), None);
    }
}
