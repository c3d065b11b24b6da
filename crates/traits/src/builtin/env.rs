use k8s_openapi::api::core::v1::EnvVar;
use ktrait_core::{Result, TraitError};
use ktrait_expr::{Traits, ENV};
use ktrait_registry::TraitContext;

use super::ORDER_ENV;
use crate::{Artifact, Trait};

fn parse_var(raw: &str) -> Result<EnvVar> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok(EnvVar {
            name: name.trim().to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }),
        _ => Err(TraitError::config(ENV, format!("`{}` must be NAME=value", raw))),
    }
}

pub struct EnvTraitHandler;

impl Trait for EnvTraitHandler {
    fn name(&self) -> &'static str { ENV }
    fn order(&self) -> i32 { ORDER_ENV }
    fn requires(&self) -> &'static [Artifact] { &[Artifact::Container] }

    fn configure(&self, traits: &Traits, ctx: &TraitContext) -> Result<bool> {
        let Some(spec) = traits.env.as_ref() else { return Ok(false) };
        if spec.enabled == Some(false) || spec.vars.is_empty() {
            return Ok(false);
        }
        for v in &spec.vars {
            parse_var(v)?;
        }
        Ok(ctx.app_container().is_some())
    }

    fn apply(&self, traits: &Traits, ctx: &mut TraitContext) -> Result<()> {
        let vars = match traits.env.as_ref() {
            Some(spec) => spec.vars.iter().map(|v| parse_var(v)).collect::<Result<Vec<_>>>()?,
            None => return Ok(()),
        };
        // Every container of the pod shares the application environment.
        ctx.visit_containers(|c| {
            let env = c.env.get_or_insert_with(Vec::new);
            for var in &vars {
                match env.iter_mut().find(|e| e.name == var.name) {
                    Some(existing) => *existing = var.clone(),
                    None => env.push(var.clone()),
                }
            }
        });
        Ok(())
    }
}
