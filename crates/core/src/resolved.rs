//! Frozen, fully-resolved model handed to backends.
//!
//! Built once from a finished [`ScanContext`]; backends only ever see a
//! shared reference. Examples are derived here and cached next to the
//! model instead of on the source definitions.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rpcgen_common::sanitize_c_identifier;
use tracing::{debug, info};

use crate::driver::ScanContext;
use crate::error::{GenError, Result};
use crate::model::{
    BuildStage, ConfigOption, Example, HttpBinding, RpcFunctionDef, SolidityBinding, TestCase,
};
use crate::registry::{ResolvedField, ResolvedType, Resolver};

/// A method with every param and the result resolved.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    /// Method name.
    pub name: String,
    /// Owning group.
    pub group: String,
    /// Documentation.
    pub descr: String,
    /// Positional params. For aliases these are the target's.
    pub params: Vec<ResolvedField>,
    /// Result. For aliases this is the target's.
    pub result: Option<ResolvedField>,
    /// Extra native validation code.
    pub validation: Option<String>,
    /// Related methods.
    pub depends: Vec<String>,
    /// Build options guarding the native entry.
    pub cmake_options: Vec<String>,
    /// Forward target.
    pub alias: Option<String>,
    /// Skip Swift and docs.
    pub skip_api: bool,
    /// Skip native.
    pub skip_generate: bool,
    /// HTTP mapping of imported methods.
    pub http: Option<HttpBinding>,
    /// Contract mapping of imported methods.
    pub solidity: Option<SolidityBinding>,
    /// Build progress.
    pub stage: BuildStage,
}

/// A group of methods sharing one output module.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// Group key.
    pub name: String,
    /// Output file stem.
    pub module: String,
    /// Documentation.
    pub descr: String,
    /// Methods in declaration order.
    pub methods: Vec<ResolvedMethod>,
}

/// Immutable snapshot consumed by every backend.
#[derive(Debug, Clone, Default)]
pub struct ResolvedModel {
    /// Groups in scan order.
    pub groups: Vec<ResolvedGroup>,
    /// Every reachable object type, sorted by name.
    pub types: IndexMap<String, Arc<ResolvedType>>,
    /// Config options, sorted by name.
    pub config: IndexMap<String, ConfigOption>,
    /// Test cases by method.
    pub test_cases: IndexMap<String, Vec<TestCase>>,
    examples: HashMap<String, Example>,
}

struct AliasTarget {
    params: Vec<ResolvedField>,
    result: Option<ResolvedField>,
    is_alias: bool,
    skip_generate: bool,
}

impl ResolvedModel {
    /// Resolve and validate everything in `ctx`, stopping at the first error.
    pub fn build(ctx: &ScanContext) -> Result<Self> {
        let mut errors = Vec::new();
        let model = Self::build_collecting(ctx, &mut errors);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(model),
        }
    }

    /// Resolve as much as possible, pushing every structural error into `errors`.
    pub fn build_collecting(ctx: &ScanContext, errors: &mut Vec<GenError>) -> Self {
        let mut resolver = Resolver::new(&ctx.registry);
        let mut groups = Vec::new();
        let mut seen_methods: HashMap<String, String> = HashMap::new();

        for (group_name, group) in &ctx.groups {
            let mut methods = Vec::new();
            for (method_name, def) in &group.methods {
                if let Some(first_group) =
                    seen_methods.insert(method_name.clone(), group_name.clone())
                {
                    errors.push(GenError::DuplicateFunction {
                        name: method_name.clone(),
                        context: format!("defined in groups '{first_group}' and '{group_name}'"),
                    });
                    continue;
                }
                match resolve_method(&mut resolver, group_name, method_name, def) {
                    Ok(method) => methods.push(method),
                    Err(err) => errors.push(err),
                }
            }
            groups.push(ResolvedGroup {
                name: group_name.clone(),
                module: group.module.clone().unwrap_or_else(|| group_name.clone()),
                descr: group.descr.clone(),
                methods,
            });
        }

        let mut model = Self {
            groups,
            types: resolver.into_types(),
            config: {
                let mut config = ctx.config.clone();
                config.sort_keys();
                config
            },
            test_cases: ctx.test_cases.clone(),
            examples: HashMap::new(),
        };

        model.link_aliases(errors);
        model.check_collisions(errors);
        model.derive_examples(ctx);
        for method in model.groups.iter_mut().flat_map(|g| g.methods.iter_mut()) {
            match method.stage.advance(BuildStage::Validated, &method.name) {
                Ok(stage) => method.stage = stage,
                Err(err) => errors.push(err),
            }
        }

        info!(
            groups = model.groups.len(),
            methods = model.methods().count(),
            types = model.types.len(),
            "model resolved"
        );
        model
    }

    /// All methods across groups.
    pub fn methods(&self) -> impl Iterator<Item = &ResolvedMethod> {
        self.groups.iter().flat_map(|g| g.methods.iter())
    }

    /// Method by name.
    pub fn method(&self, name: &str) -> Option<&ResolvedMethod> {
        self.methods().find(|m| m.name == name)
    }

    /// Resolved object type by name.
    pub fn type_def(&self, name: &str) -> Option<&Arc<ResolvedType>> {
        self.types.get(name)
    }

    /// Documentation example of a method: the declared one, else the first
    /// test case with an expected output.
    pub fn example(&self, method: &str) -> Option<&Example> {
        self.examples.get(method)
    }

    /// Record that the backends have run over every method.
    pub fn mark_emitted(&mut self) -> Result<()> {
        for method in self.groups.iter_mut().flat_map(|g| g.methods.iter_mut()) {
            method.stage = method.stage.advance(BuildStage::Emitted, &method.name)?;
        }
        Ok(())
    }

    fn link_aliases(&mut self, errors: &mut Vec<GenError>) {
        let targets: HashMap<String, AliasTarget> = self
            .methods()
            .map(|m| {
                (
                    m.name.clone(),
                    AliasTarget {
                        params: m.params.clone(),
                        result: m.result.clone(),
                        is_alias: m.alias.is_some(),
                        skip_generate: m.skip_generate,
                    },
                )
            })
            .collect();

        for method in self.groups.iter_mut().flat_map(|g| g.methods.iter_mut()) {
            let Some(target) = &method.alias else {
                continue;
            };
            match targets.get(target) {
                None => errors.push(GenError::UnknownAlias {
                    method: method.name.clone(),
                    target: target.clone(),
                }),
                Some(t) if t.is_alias => errors.push(GenError::AliasChain {
                    method: method.name.clone(),
                    target: target.clone(),
                }),
                // a skipGenerate target has no native handler to forward to
                Some(t) if t.skip_generate && !method.skip_generate => {
                    errors.push(GenError::AliasOfSkipped {
                        method: method.name.clone(),
                        target: target.clone(),
                    });
                }
                Some(t) => {
                    method.params.clone_from(&t.params);
                    method.result.clone_from(&t.result);
                    debug!(method = %method.name, target = %target, "linked alias");
                }
            }
        }
    }

    fn check_collisions(&self, errors: &mut Vec<GenError>) {
        for method in self.methods() {
            if let Err(err) =
                check_identifiers(&method.name, method.params.iter().map(|p| p.name.as_str()))
            {
                errors.push(err);
            }
        }
        for ty in self.types.values() {
            if let Err(err) = check_identifiers(&ty.name, ty.fields.keys().map(String::as_str)) {
                errors.push(err);
            }
        }
    }

    fn derive_examples(&mut self, ctx: &ScanContext) {
        for (group_name, group) in &ctx.groups {
            for (method_name, def) in &group.methods {
                let example = def.example.clone().or_else(|| {
                    ctx.test_cases.get(method_name).and_then(|cases| {
                        cases.iter().find_map(|case| {
                            case.expected_output.as_ref().map(|out| Example {
                                request: case.input.clone(),
                                response: out.clone(),
                            })
                        })
                    })
                });
                if let Some(example) = example {
                    debug!(group = %group_name, method = %method_name, "example available");
                    self.examples.insert(method_name.clone(), example);
                }
            }
        }
    }
}

fn resolve_method(
    resolver: &mut Resolver<'_>,
    group: &str,
    name: &str,
    def: &RpcFunctionDef,
) -> Result<ResolvedMethod> {
    let mut stage = BuildStage::Discovered;
    let mut params = Vec::new();
    let mut result = None;

    // alias params come from the target once every method is resolved
    if def.alias.is_none() {
        for (param_name, shape) in &def.params {
            let path = format!("{group}.{name}.{param_name}");
            params.push(resolver.resolve_field(name, param_name, &shape.to_def(), &path)?);
        }
        if let Some(shape) = &def.result {
            let path = format!("{group}.{name}.result");
            result = Some(resolver.resolve_field(
                &format!("{name}_result"),
                "",
                &shape.to_def(),
                &path,
            )?);
        }
    }
    stage = stage.advance(BuildStage::ParamsResolved, name)?;

    Ok(ResolvedMethod {
        name: name.to_string(),
        group: group.to_string(),
        descr: def.descr.clone(),
        params,
        result,
        validation: def.validation.clone(),
        depends: def.depends.clone(),
        cmake_options: def.cmake_options.clone(),
        alias: def.alias.clone(),
        skip_api: def.skip_api,
        skip_generate: def.skip_generate,
        http: def.http.clone(),
        solidity: def.solidity.clone(),
        stage,
    })
}

/// Fail when two names map to the same emitted C identifier.
pub fn check_identifiers<'a>(owner: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        let ident = sanitize_c_identifier(name);
        if let Some(first) = seen.insert(ident.clone(), name) {
            return Err(GenError::DispatchCollision {
                owner: owner.to_string(),
                first: first.to_string(),
                second: name.to_string(),
                ident,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::SchemaFile;

    fn context(yaml: &str) -> ScanContext {
        let mut ctx = ScanContext::default();
        let file: SchemaFile = serde_yaml::from_str(yaml).unwrap();
        ctx.add_schema(file);
        ctx
    }

    #[test]
    fn test_alias_takes_target_signature() {
        let ctx = context(
            r#"
eth:
  eth_getBalance:
    params:
      account: address
      block: uint64
    result: uint256
  balance:
    alias: eth_getBalance
"#,
        );
        let model = ResolvedModel::build(&ctx).unwrap();
        let alias = model.method("balance").unwrap();
        let target = model.method("eth_getBalance").unwrap();
        assert_eq!(alias.params, target.params);
        assert_eq!(alias.result, target.result);
        assert_eq!(alias.stage, BuildStage::Validated);
    }

    #[test]
    fn test_unknown_alias_and_chain() {
        let ctx = context("g:\n  a:\n    alias: missing\n  b:\n    result: bool\n  c:\n    alias: d\n  d:\n    alias: b\n");
        let mut errors = Vec::new();
        ResolvedModel::build_collecting(&ctx, &mut errors);
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert!(messages.iter().any(|m| m.contains("aliases unknown method 'missing'")));
        assert!(messages.iter().any(|m| m.contains("'c' aliases 'd', which is itself an alias")));
    }

    #[test]
    fn test_alias_of_skipped_target() {
        let ctx = context(
            "g:\n  hidden:\n    skipGenerate: true\n    result: bool\n  visible:\n    alias: hidden\n",
        );
        let err = ResolvedModel::build(&ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "method 'visible' aliases 'hidden', which is marked skipGenerate"
        );

        let ctx = context(
            "g:\n  hidden:\n    skipGenerate: true\n    result: bool\n  also_hidden:\n    alias: hidden\n    skipGenerate: true\n",
        );
        let model = ResolvedModel::build(&ctx).unwrap();
        assert!(model.method("also_hidden").unwrap().result.is_some());
    }

    #[test]
    fn test_param_identifier_collision() {
        let ctx = context("g:\n  m:\n    params:\n      block-number: uint64\n      block_number: uint64\n");
        let err = ResolvedModel::build(&ctx).unwrap_err();
        assert!(matches!(err, GenError::DispatchCollision { .. }));
    }

    #[test]
    fn test_unknown_param_type_is_fatal_with_path() {
        let ctx = context("eth:\n  m:\n    params:\n      who: adress\n");
        let err = ResolvedModel::build(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "unknown type 'adress' at eth.m.who");
    }

    #[test]
    fn test_example_from_first_test_case() {
        let mut ctx = context("g:\n  m:\n    params:\n      a: uint32\n    result: uint32\n");
        let cases: crate::model::TestFile = serde_yaml::from_str(
            "m:\n  - input: [1]\n    expected_failure: boom\n  - input: [2]\n    expected_output: 4\n",
        )
        .unwrap();
        ctx.add_test_file(std::path::Path::new("m.test.yml"), cases);
        let model = ResolvedModel::build(&ctx).unwrap();
        let example = model.example("m").unwrap();
        assert_eq!(example.request, vec![serde_json::json!(2)]);
        assert_eq!(example.response, serde_json::json!(4));
    }
}
