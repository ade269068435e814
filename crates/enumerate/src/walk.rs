//! Breadth-first walk over a [`TypeSurface`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use purity_interchange::{
    MethodDescriptor, PollutionPath, ReflectedType, SkippedNode, TypeGraph,
};
use tracing::{debug, info, warn};

use crate::filter::{DomainFilter, TypeClass};
use crate::surface::{RawMethod, RawType, TypeRef, TypeSurface};
use crate::EnumerateError;

/// Walks every type reachable from a set of roots.
pub struct TypeEnumerator<S> {
    surface: S,
    filter: DomainFilter,
}

/// Per-walk mutable state. Dropped when the graph is assembled.
#[derive(Default)]
struct Walk {
    queue: VecDeque<String>,
    visited: BTreeSet<String>,
    types: BTreeMap<String, ReflectedType>,
    pollution_paths: Vec<PollutionPath>,
    skipped: Vec<SkippedNode>,
}

impl Walk {
    /// Enqueue a type unless it has been seen before.
    fn offer(&mut self, type_name: &str) {
        if self.visited.insert(type_name.to_string()) {
            self.queue.push_back(type_name.to_string());
        }
    }

    fn skip(&mut self, type_name: &str, method: Option<&str>, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(type_name, method, %reason, "skipped during enumeration");
        self.skipped.push(SkippedNode {
            type_name: type_name.to_string(),
            method: method.map(str::to_string),
            reason,
        });
    }
}

impl<S: TypeSurface> TypeEnumerator<S> {
    pub fn new(surface: S, filter: DomainFilter) -> Self {
        TypeEnumerator { surface, filter }
    }

    pub fn filter(&self) -> &DomainFilter {
        &self.filter
    }

    /// Enumerate the graph reachable from `roots` and tag it with `version`.
    ///
    /// Unreadable types and methods end up in [`TypeGraph::skipped`]; the
    /// only hard error is an empty root list.
    pub fn enumerate(&self, version: &str, roots: &[&str]) -> Result<TypeGraph, EnumerateError> {
        if roots.is_empty() {
            return Err(EnumerateError::NoRoots);
        }

        let mut walk = Walk::default();
        for root in roots {
            walk.offer(root);
        }

        while let Some(type_name) = walk.queue.pop_front() {
            match self.surface.describe(&type_name) {
                Ok(Some(raw)) => self.record(&mut walk, &type_name, raw),
                Ok(None) => walk.skip(&type_name, None, "not described by surface"),
                Err(e) => walk.skip(&type_name, None, e.to_string()),
            }
        }

        let Walk {
            types,
            mut pollution_paths,
            mut skipped,
            ..
        } = walk;
        pollution_paths.sort();
        pollution_paths.dedup();
        skipped.sort();

        let graph = TypeGraph {
            version: version.to_string(),
            handle_type: self.filter.handle_type().to_string(),
            types,
            pollution_paths,
            skipped,
        };
        graph.validate().map_err(EnumerateError::Graph)?;

        info!(
            version,
            types = graph.types.len(),
            pollution_paths = graph.pollution_paths.len(),
            skipped = graph.skipped.len(),
            "enumeration complete"
        );
        Ok(graph)
    }

    fn record(&self, walk: &mut Walk, type_name: &str, raw: RawType) {
        let mut methods: BTreeMap<String, MethodDescriptor> = BTreeMap::new();
        let mut derived: BTreeSet<String> = BTreeSet::new();

        for method in raw.methods.into_iter().filter(|m| m.exported) {
            if methods.contains_key(&method.name) {
                walk.skip(type_name, Some(&method.name), "duplicate method name");
                continue;
            }
            if let Some(bad) = method
                .params
                .iter()
                .chain(&method.returns)
                .find(|t| !t.is_readable())
            {
                walk.skip(
                    type_name,
                    Some(&method.name),
                    format!("unreadable type in signature: {}", bad),
                );
                continue;
            }

            for name in method
                .params
                .iter()
                .chain(&method.returns)
                .flat_map(TypeRef::named_types)
            {
                if self.filter.classify(name) == TypeClass::Domain {
                    walk.offer(name);
                }
            }
            for ret in &method.returns {
                if let Some(name) = self.domain_name(ret) {
                    if name != type_name {
                        derived.insert(name.to_string());
                    }
                }
            }

            let descriptor = self.describe_method(&method);
            for reason in descriptor.pollution_reasons() {
                walk.pollution_paths.push(PollutionPath {
                    type_name: type_name.to_string(),
                    method: descriptor.name.clone(),
                    reason,
                });
            }
            methods.insert(method.name, descriptor);
        }

        debug!(type_name, methods = methods.len(), "recorded type");
        walk.types.insert(
            type_name.to_string(),
            ReflectedType {
                type_name: type_name.to_string(),
                methods: methods.into_values().collect(),
                derived_types: derived.into_iter().collect(),
            },
        );
    }

    fn domain_name<'a>(&self, ty: &'a TypeRef) -> Option<&'a str> {
        ty.name()
            .filter(|name| self.filter.classify(name) == TypeClass::Domain)
    }

    fn describe_method(&self, method: &RawMethod) -> MethodDescriptor {
        let last = method.params.len().saturating_sub(1);
        let in_types: Vec<String> = method
            .params
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if method.variadic && i == last {
                    format!("...{}", t)
                } else {
                    t.to_string()
                }
            })
            .collect();
        let out_types: Vec<String> = method.returns.iter().map(ToString::to_string).collect();
        let signature = MethodDescriptor::render_signature(&method.name, &in_types, &out_types);

        MethodDescriptor {
            name: method.name.clone(),
            in_types,
            out_types,
            variadic: method.variadic,
            returns_handle: method.returns.iter().any(|t| self.filter.is_handle(t)),
            takes_handle: method.params.iter().any(|t| self.filter.is_handle(t)),
            takes_handle_callback: method
                .params
                .iter()
                .any(|t| self.filter.is_handle_callback(t)),
            signature,
        }
    }
}
