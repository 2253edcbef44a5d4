//! Type registry and resolver.
//!
//! The registry holds every named type discovered during the scan. The
//! resolver turns type references into merged, fully-typed definitions:
//! - a registered name resolves to its (memoized) definition
//! - an unregistered name must be a primitive
//! - `_extends` overlays the child's fields on the parent's (child wins)
//!
//! Field references to other object types are kept by name, so recursive
//! type graphs stay finite.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rpcgen_common::to_pascal_case;
use serde_json::Value;
use tracing::debug;

use crate::error::{GenError, Result};
use crate::model::{Encoding, FieldDef, TypeBody, TypeShape};
use crate::primitive::Primitive;

/// Named type definitions plus the structural dedup index.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeBody>,
    shapes: HashMap<Vec<String>, String>,
}

impl TypeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named type.
    ///
    /// Replacing a type re-indexes its shape: the old field set falls back to
    /// the next type registered with it, if any.
    pub fn insert(&mut self, name: impl Into<String>, body: TypeBody) {
        let name = name.into();
        let new_key = body.shape_key();
        if let Some(old) = self.types.insert(name.clone(), body) {
            let old_key = old.shape_key();
            if old_key != new_key && self.shapes.get(&old_key) == Some(&name) {
                self.shapes.remove(&old_key);
                let heir = self
                    .types
                    .iter()
                    .find(|(other, other_body)| **other != name && other_body.shape_key() == old_key)
                    .map(|(other, _)| other.clone());
                if let Some(heir) = heir {
                    self.shapes.insert(old_key, heir);
                }
            }
        }
        self.shapes.entry(new_key).or_insert(name);
    }

    /// Look a type up by name.
    pub fn get(&self, name: &str) -> Option<&TypeBody> {
        self.types.get(name)
    }

    /// Mutable lookup, used by importers merging newly seen properties.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeBody> {
        self.types.get_mut(name)
    }

    /// Whether a type of this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Name of the first type registered with exactly this sorted field-name set.
    pub fn find_by_shape(&self, key: &[String]) -> Option<&str> {
        self.shapes.get(key).map(String::as_str)
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// What a resolved field holds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A scalar.
    Primitive(Primitive),
    /// A resolved object type, by name.
    Object(String),
}

/// A field with its type resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Field or parameter name as declared.
    pub name: String,
    /// Element type.
    pub kind: FieldKind,
    /// JSON array of `kind`.
    pub array: bool,
    /// May be absent.
    pub optional: bool,
    /// Value when absent.
    pub default: Option<Value>,
    /// Lower length bound.
    pub min_length: Option<u64>,
    /// Upper length bound.
    pub max_length: Option<u64>,
    /// Allowed string values.
    pub enum_values: Option<Vec<String>>,
    /// Byte encoding.
    pub encoding: Option<Encoding>,
    /// Format hint.
    pub format: Option<String>,
    /// Documentation.
    pub descr: String,
}

impl ResolvedField {
    /// Required scalar field with no constraints.
    pub fn primitive(name: impl Into<String>, prim: Primitive) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Primitive(prim),
            array: false,
            optional: false,
            default: None,
            min_length: None,
            max_length: None,
            enum_values: None,
            encoding: None,
            format: None,
            descr: String::new(),
        }
    }

    fn from_def(name: &str, kind: FieldKind, def: &FieldDef) -> Self {
        Self {
            name: name.to_string(),
            kind,
            array: def.array,
            optional: def.optional,
            default: def.default.clone(),
            min_length: def.min_length,
            max_length: def.max_length,
            enum_values: def.enum_values.clone(),
            encoding: def.encoding,
            format: def.format.clone(),
            descr: def.descr.clone(),
        }
    }

    /// Type name as written in docs: `uint256`, `Tx[]`.
    pub fn type_label(&self) -> String {
        let base = match &self.kind {
            FieldKind::Primitive(p) => p.name(),
            FieldKind::Object(n) => n.clone(),
        };
        if self.array { format!("{base}[]") } else { base }
    }

    /// Object type name, if any.
    pub fn object(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Object(n) => Some(n),
            FieldKind::Primitive(_) => None,
        }
    }
}

/// A type with `_extends` merged and every field resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    /// Registered or synthesized name.
    pub name: String,
    /// Fields, parent fields first in parent order, overrides in place.
    pub fields: IndexMap<String, ResolvedField>,
}

/// Memoizing resolver over a registry.
///
/// Each named type is merged exactly once; every later lookup returns the
/// same `Arc`.
#[derive(Debug)]
pub struct Resolver<'r> {
    registry: &'r TypeRegistry,
    memo: HashMap<String, Arc<ResolvedType>>,
    order: Vec<String>,
    in_progress: Vec<String>,
    extends_stack: Vec<String>,
    // synthesized inline type name -> (owner, field) it was made for
    synthesized: HashMap<String, (String, String)>,
}

impl<'r> Resolver<'r> {
    /// Resolver over `registry`.
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            memo: HashMap::new(),
            order: Vec::new(),
            in_progress: Vec::new(),
            extends_stack: Vec::new(),
            synthesized: HashMap::new(),
        }
    }

    /// Resolve a registered type by name. `path` locates the reference for errors.
    pub fn resolve_named(&mut self, name: &str, path: &str) -> Result<Arc<ResolvedType>> {
        if let Some(done) = self.memo.get(name) {
            return Ok(Arc::clone(done));
        }
        if let Some(pos) = self.extends_stack.iter().position(|n| n == name) {
            let mut chain = self.extends_stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(GenError::ExtendsCycle {
                chain: chain.join(" -> "),
            });
        }
        let registry = self.registry;
        let body = registry.get(name).ok_or_else(|| GenError::UnknownType {
            name: name.to_string(),
            path: path.to_string(),
        })?;

        self.extends_stack.push(name.to_string());
        self.in_progress.push(name.to_string());
        let resolved = self.resolve_body(name, body, path);
        self.in_progress.pop();
        self.extends_stack.pop();

        Ok(self.remember(resolved?))
    }

    /// Resolve one field definition owned by `owner`.
    ///
    /// Inline bodies get a synthesized name `<Owner><Field>`.
    pub fn resolve_field(
        &mut self,
        owner: &str,
        name: &str,
        def: &FieldDef,
        path: &str,
    ) -> Result<ResolvedField> {
        let kind = match &def.ty {
            TypeShape::Name(type_name) => self.resolve_reference(type_name, path)?,
            TypeShape::Inline(body) => {
                let synth = self.synthesize_name(owner, name)?;
                // field references are not part of the _extends chain
                let saved = std::mem::take(&mut self.extends_stack);
                self.in_progress.push(synth.clone());
                let resolved = self.resolve_body(&synth, body, path);
                self.in_progress.pop();
                self.extends_stack = saved;
                let resolved = self.remember(resolved?);
                FieldKind::Object(resolved.name.clone())
            }
        };
        Ok(ResolvedField::from_def(name, kind, def))
    }

    /// Every type resolved so far, in first-resolution order.
    pub fn resolved(&self) -> impl Iterator<Item = &Arc<ResolvedType>> {
        self.order.iter().filter_map(|n| self.memo.get(n))
    }

    /// Consume the resolver, returning resolved types sorted by name.
    pub fn into_types(self) -> IndexMap<String, Arc<ResolvedType>> {
        let mut types: IndexMap<String, Arc<ResolvedType>> = self.memo.into_iter().collect();
        types.sort_keys();
        types
    }

    fn resolve_reference(&mut self, type_name: &str, path: &str) -> Result<FieldKind> {
        if self.registry.contains(type_name) {
            let pending = self.in_progress.iter().any(|n| n == type_name);
            if !pending && !self.memo.contains_key(type_name) {
                let saved = std::mem::take(&mut self.extends_stack);
                let result = self.resolve_named(type_name, path);
                self.extends_stack = saved;
                result?;
            }
            return Ok(FieldKind::Object(type_name.to_string()));
        }
        Primitive::parse(type_name)
            .map(FieldKind::Primitive)
            .ok_or_else(|| GenError::UnknownType {
                name: type_name.to_string(),
                path: path.to_string(),
            })
    }

    fn resolve_body(&mut self, name: &str, body: &TypeBody, path: &str) -> Result<ResolvedType> {
        let mut fields = IndexMap::new();

        if let Some(parent) = &body.extends {
            let parent = match parent.as_ref() {
                TypeShape::Name(parent_name) => {
                    self.resolve_named(parent_name, &format!("{path}._extends"))?
                }
                TypeShape::Inline(parent_body) => Arc::new(self.resolve_body(
                    &format!("{name}Base"),
                    parent_body,
                    &format!("{path}._extends"),
                )?),
            };
            fields.clone_from(&parent.fields);
        }

        for (field_name, shape) in &body.fields {
            let def = shape.to_def();
            let field = self.resolve_field(name, field_name, &def, &format!("{path}.{field_name}"))?;
            fields.insert(field_name.clone(), field);
        }

        debug!(type_name = name, fields = fields.len(), "resolved type");
        Ok(ResolvedType {
            name: name.to_string(),
            fields,
        })
    }

    fn remember(&mut self, resolved: ResolvedType) -> Arc<ResolvedType> {
        // a type can be merged twice when its parent chain was entered through
        // a field reference while it was still in progress; keep the first
        if let Some(existing) = self.memo.get(&resolved.name) {
            return Arc::clone(existing);
        }
        let name = resolved.name.clone();
        let resolved = Arc::new(resolved);
        self.memo.insert(name.clone(), Arc::clone(&resolved));
        self.order.push(name);
        resolved
    }

    fn synthesize_name(&mut self, owner: &str, field: &str) -> Result<String> {
        let origin = (owner.to_string(), field.to_string());
        let base = format!("{}{}", to_pascal_case(owner), to_pascal_case(field));
        let free = |candidate: &str| {
            !self.registry.contains(candidate)
                && self
                    .synthesized
                    .get(candidate)
                    .is_none_or(|taken_by| *taken_by == origin)
        };
        let name = if free(&base) {
            base
        } else {
            (1..1000)
                .map(|i| format!("{base}{i}"))
                .find(|candidate| free(candidate))
                .ok_or(GenError::SuffixExhausted { base })?
        };
        self.synthesized.insert(name.clone(), origin);
        Ok(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn registry(yaml: &str) -> TypeRegistry {
        let types: IndexMap<String, TypeBody> = serde_yaml::from_str(yaml).unwrap();
        let mut reg = TypeRegistry::new();
        for (name, body) in types {
            reg.insert(name, body);
        }
        reg
    }

    #[test]
    fn test_extends_child_wins() {
        let reg = registry(
            r#"
Base:
  id: uint64
  label: string
Child:
  _extends: Base
  label:
    type: string
    optional: true
  extra: bool
"#,
        );
        let mut resolver = Resolver::new(&reg);
        let base = resolver.resolve_named("Base", "t").unwrap();
        let child = resolver.resolve_named("Child", "t").unwrap();
        assert_eq!(child.fields.keys().collect::<Vec<_>>(), vec!["id", "label", "extra"]);
        assert_eq!(child.fields["id"], base.fields["id"]);
        assert!(child.fields["label"].optional);
        assert!(!child.fields.contains_key("_extends"));
    }

    #[test]
    fn test_resolution_is_memoized() {
        let reg = registry("Base:\n  id: uint64\nChild:\n  _extends: Base\n  x: bool\n");
        let mut resolver = Resolver::new(&reg);
        let first = resolver.resolve_named("Child", "a").unwrap();
        let second = resolver.resolve_named("Child", "b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.fields.len(), 2);
    }

    #[test]
    fn test_extends_cycle_is_fatal() {
        let reg = registry("A:\n  _extends: B\n  a: bool\nB:\n  _extends: A\n  b: bool\n");
        let mut resolver = Resolver::new(&reg);
        let err = resolver.resolve_named("A", "g.m.p").unwrap_err();
        match err {
            GenError::ExtendsCycle { chain } => assert_eq!(chain, "A -> B -> A"),
            other => unreachable!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let reg = registry("Node:\n  value: uint32\n  next:\n    type: Node\n    optional: true\n");
        let mut resolver = Resolver::new(&reg);
        let node = resolver.resolve_named("Node", "p").unwrap();
        assert_eq!(node.fields["next"].kind, FieldKind::Object("Node".into()));
    }

    #[test]
    fn test_field_reference_into_type_being_extended() {
        let reg = registry(
            "A:\n  _extends: B\n  a: bool\nB:\n  child: C\nC:\n  _extends: A\n  c: bool\n",
        );
        let mut resolver = Resolver::new(&reg);
        let a = resolver.resolve_named("A", "p").unwrap();
        assert_eq!(a.fields.keys().collect::<Vec<_>>(), vec!["child", "a"]);
        let c = resolver.resolve_named("C", "p").unwrap();
        assert_eq!(c.fields.keys().collect::<Vec<_>>(), vec!["child", "a", "c"]);
        assert!(Arc::ptr_eq(&a, &resolver.resolve_named("A", "p").unwrap()));
    }

    #[test]
    fn test_unknown_type_reports_path() {
        let reg = registry("Tx:\n  to: adress\n");
        let mut resolver = Resolver::new(&reg);
        let err = resolver.resolve_named("Tx", "eth.send.tx").unwrap_err();
        assert_eq!(err.to_string(), "unknown type 'adress' at eth.send.tx.to");
    }

    #[test]
    fn test_inline_body_gets_synthesized_name() {
        let reg = TypeRegistry::new();
        let mut resolver = Resolver::new(&reg);
        let def: FieldDef = serde_yaml::from_str("type:\n  a: uint8\n  b: string\n").unwrap();
        let field = resolver.resolve_field("get_block", "filter", &def, "g.get_block.filter").unwrap();
        assert_eq!(field.object(), Some("GetBlockFilter"));
        assert_eq!(resolver.resolved().count(), 1);
    }

    #[test]
    fn test_shape_index() {
        let reg = registry("P:\n  b: bool\n  a: bool\nQ:\n  a: bool\n  b: bool\n");
        assert_eq!(reg.find_by_shape(&["a".into(), "b".into()]), Some("P"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_replaced_type_releases_its_old_shape() {
        let mut reg = registry("Foo:\n  a: bool\n  b: bool\nBar:\n  b: bool\n  a: bool\n");
        let body: TypeBody = serde_yaml::from_str("c: bool\n").unwrap();
        reg.insert("Foo", body);
        assert_eq!(reg.find_by_shape(&["a".into(), "b".into()]), Some("Bar"));
        assert_eq!(reg.find_by_shape(&["c".into()]), Some("Foo"));

        let body: TypeBody = serde_yaml::from_str("d: bool\n").unwrap();
        reg.insert("Bar", body);
        assert_eq!(reg.find_by_shape(&["a".into(), "b".into()]), None);
    }

    #[test]
    fn test_colliding_inline_names_get_suffixes() {
        let reg = TypeRegistry::new();
        let mut resolver = Resolver::new(&reg);
        let first: FieldDef = serde_yaml::from_str("type:\n  from: uint64\n").unwrap();
        let second: FieldDef = serde_yaml::from_str("type:\n  name: string\n  count: uint32\n").unwrap();
        let a = resolver.resolve_field("get_block", "filter", &first, "g.get_block.filter").unwrap();
        let b = resolver.resolve_field("get", "block_filter", &second, "g.get.block_filter").unwrap();
        assert_eq!(a.object(), Some("GetBlockFilter"));
        assert_eq!(b.object(), Some("GetBlockFilter1"));

        let result: FieldDef = serde_yaml::from_str("type:\n  hash: bytes32\n").unwrap();
        let param: FieldDef = serde_yaml::from_str("type:\n  full: bool\n").unwrap();
        let r = resolver.resolve_field("get_block_result", "", &result, "g.get_block.result").unwrap();
        let p = resolver.resolve_field("get_block", "result", &param, "g.get_block.result").unwrap();
        assert_eq!(r.object(), Some("GetBlockResult"));
        assert_eq!(p.object(), Some("GetBlockResult1"));

        let types = resolver.into_types();
        assert_eq!(types["GetBlockFilter"].fields.keys().collect::<Vec<_>>(), vec!["from"]);
        assert_eq!(types["GetBlockFilter1"].fields.keys().collect::<Vec<_>>(), vec!["name", "count"]);
        assert!(types["GetBlockResult1"].fields.contains_key("full"));
    }
}
