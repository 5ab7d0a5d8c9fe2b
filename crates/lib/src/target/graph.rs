//! The target graph.
//!
//! Targets are nodes of a petgraph `DiGraph`; edges point from a dependency to
//! its dependent, so a topological sort yields dependency-first order. Link
//! edges are validated when they are inserted: a link that would close a cycle
//! is rejected and leaves the graph untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use super::types::{
  Access, ExternalSpec, GraphError, IncludeDir, MacroDef, MacroValue, Target, TargetId, TargetKind, TargetOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
  /// The dependent links the dependency.
  Link,
  /// The dependent is a package bundling the dependency.
  Member,
}

/// The declarative graph of buildable units for one project.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
  graph: DiGraph<Target, EdgeKind>,
  by_name: HashMap<String, NodeIndex>,
}

impl TargetGraph {
  pub fn new() -> Self {
    Self::default()
  }

  fn register(&mut self, target: Target) -> Result<TargetId, GraphError> {
    if self.by_name.contains_key(&target.name) {
      return Err(GraphError::DuplicateTarget(target.name));
    }
    let name = target.name.clone();
    let kind = target.kind;
    let idx = self.graph.add_node(target);
    self.by_name.insert(name.clone(), idx);
    debug!(target = %name, kind = %kind, "registered target");
    Ok(TargetId(idx))
  }

  fn native(&mut self, name: &str, kind: TargetKind, sources: Vec<PathBuf>) -> Result<TargetId, GraphError> {
    if sources.is_empty() {
      return Err(GraphError::InvalidDeclaration {
        target: name.to_string(),
        message: format!("a {} requires at least one source", kind),
      });
    }
    let mut target = Target::new(name, kind);
    target.sources = sources;
    self.register(target)
  }

  /// Register a static (or, with `dynamic`, a dynamic) library.
  pub fn add_library(&mut self, name: &str, sources: Vec<PathBuf>, dynamic: bool) -> Result<TargetId, GraphError> {
    let kind = if dynamic {
      TargetKind::DynamicLibrary
    } else {
      TargetKind::Library
    };
    self.native(name, kind, sources)
  }

  pub fn add_executable(&mut self, name: &str, sources: Vec<PathBuf>) -> Result<TargetId, GraphError> {
    self.native(name, TargetKind::Executable, sources)
  }

  /// Register a vendored library built by a secondary tool.
  pub fn add_external_library(&mut self, name: &str, spec: ExternalSpec) -> Result<TargetId, GraphError> {
    let mut target = Target::new(name, TargetKind::ExternalLibrary);
    target.external = Some(spec);
    self.register(target)
  }

  /// Register a package bundling `members` as a named release unit.
  pub fn add_package(&mut self, name: &str, members: &[TargetId]) -> Result<TargetId, GraphError> {
    for member in members {
      self.check_exists(*member)?;
    }
    let mut target = Target::new(name, TargetKind::Package);
    let mut unique = Vec::with_capacity(members.len());
    for member in members {
      if !unique.contains(member) {
        unique.push(*member);
      }
    }
    target.members = unique.clone();
    let id = self.register(target)?;
    for member in unique {
      self.graph.add_edge(member.0, id.0, EdgeKind::Member);
    }
    Ok(id)
  }

  /// Add include directories to a target.
  pub fn target_includes<I>(&mut self, id: TargetId, access: Access, dirs: I) -> Result<(), GraphError>
  where
    I: IntoIterator<Item = PathBuf>,
  {
    let target = self.attributable(id, "includes")?;
    target
      .includes
      .extend(dirs.into_iter().map(|path| IncludeDir { path, access }));
    Ok(())
  }

  /// Add macro definitions to a target.
  ///
  /// Redefining a name already declared on the same target replaces it.
  pub fn target_macros<I>(&mut self, id: TargetId, access: Access, macros: I) -> Result<(), GraphError>
  where
    I: IntoIterator<Item = (String, MacroValue)>,
  {
    let target = self.attributable(id, "macros")?;
    for (name, value) in macros {
      target.macros.retain(|m| m.name != name);
      target.macros.push(MacroDef { name, value, access });
    }
    Ok(())
  }

  /// Replace the native build options of a target.
  pub fn set_options(&mut self, id: TargetId, options: TargetOptions) -> Result<(), GraphError> {
    self.check_exists(id)?;
    let target = &mut self.graph[id.0];
    if !target.kind.is_native() {
      return Err(GraphError::InvalidDeclaration {
        target: target.name.clone(),
        message: format!("a {} has no native build options", target.kind),
      });
    }
    target.options = options;
    Ok(())
  }

  /// Declare that `id` links each of `deps`, in order.
  ///
  /// Every edge is validated before any is inserted, so a rejected call
  /// leaves the graph unchanged.
  pub fn target_links(&mut self, id: TargetId, deps: &[TargetId]) -> Result<(), GraphError> {
    self.check_exists(id)?;
    let from = self.graph[id.0].name.clone();

    if self.graph[id.0].kind == TargetKind::Package {
      return Err(GraphError::InvalidDeclaration {
        target: from,
        message: "a package has no links; list its members instead".to_string(),
      });
    }

    for dep in deps {
      self.check_exists(*dep)?;
      let to = &self.graph[dep.0];

      if !to.kind.is_linkable() {
        return Err(GraphError::InvalidLink {
          from,
          to: to.name.clone(),
          reason: format!("a {} cannot be linked", to.kind),
        });
      }

      // An edge dep -> id closes a cycle iff dep already depends on id.
      if *dep == id || has_path_connecting(&self.graph, id.0, dep.0, None) {
        return Err(GraphError::CyclicDependency {
          from,
          to: to.name.clone(),
        });
      }
    }

    for dep in deps {
      if self.graph[id.0].links.contains(dep) {
        continue;
      }
      self.graph.add_edge(dep.0, id.0, EdgeKind::Link);
      self.graph[id.0].links.push(*dep);
    }
    Ok(())
  }

  fn check_exists(&self, id: TargetId) -> Result<(), GraphError> {
    if self.graph.node_weight(id.0).is_none() {
      return Err(GraphError::UnknownTarget(format!("#{}", id.0.index())));
    }
    Ok(())
  }

  fn attributable(&mut self, id: TargetId, what: &str) -> Result<&mut Target, GraphError> {
    self.check_exists(id)?;
    let target = &mut self.graph[id.0];
    if target.kind == TargetKind::Package {
      return Err(GraphError::InvalidDeclaration {
        target: target.name.clone(),
        message: format!("a package cannot declare {}", what),
      });
    }
    Ok(target)
  }

  pub fn get(&self, id: TargetId) -> &Target {
    &self.graph[id.0]
  }

  pub fn id_of(&self, name: &str) -> Option<TargetId> {
    self.by_name.get(name).copied().map(TargetId)
  }

  pub fn by_name(&self, name: &str) -> Option<&Target> {
    self.id_of(name).map(|id| self.get(id))
  }

  /// All target ids in registration order.
  pub fn ids(&self) -> impl Iterator<Item = TargetId> + '_ {
    self.graph.node_indices().map(TargetId)
  }

  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.graph.node_weights()
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Direct prerequisites of a target: its links and, for a package, its members.
  pub fn dependencies(&self, id: TargetId) -> Vec<TargetId> {
    let mut deps: Vec<TargetId> = self
      .graph
      .neighbors_directed(id.0, Direction::Incoming)
      .map(TargetId)
      .collect();
    deps.sort();
    deps.dedup();
    deps
  }

  /// Targets in an order where every target follows its dependencies.
  pub fn topological_order(&self) -> Result<Vec<TargetId>, GraphError> {
    toposort(&self.graph, None)
      .map(|sorted| sorted.into_iter().map(TargetId).collect())
      .map_err(|cycle| {
        let name = self.graph[cycle.node_id()].name.clone();
        GraphError::CyclicDependency {
          from: name.clone(),
          to: name,
        }
      })
  }

  /// Group targets into waves where each wave depends only on earlier waves.
  ///
  /// Targets within a wave are ordered by name.
  pub fn waves(&self) -> Result<Vec<Vec<TargetId>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();

      if ready.is_empty() {
        let stuck = remaining.iter().map(|idx| self.graph[*idx].name.clone()).min().unwrap_or_default();
        return Err(GraphError::CyclicDependency {
          from: stuck.clone(),
          to: stuck,
        });
      }

      ready.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));

      for idx in &ready {
        remaining.remove(idx);
        // Parallel edges (link + member) are counted once per edge.
        for edge in self.graph.edges_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&edge.target()) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(TargetId).collect());
    }

    Ok(waves)
  }

  /// Transitively linked targets, depth first in declaration order, each
  /// visited once. A dependency's own dependencies precede it.
  fn linked_post_order(&self, id: TargetId) -> Vec<TargetId> {
    fn visit(graph: &TargetGraph, id: TargetId, seen: &mut HashSet<TargetId>, out: &mut Vec<TargetId>) {
      for dep in &graph.get(id).links {
        if seen.insert(*dep) {
          visit(graph, *dep, seen, out);
          out.push(*dep);
        }
      }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(self, id, &mut seen, &mut out);
    out
  }

  /// Transitively linked targets, depth first in declaration order, each
  /// visited once. A dependency precedes its own dependencies.
  fn linked_pre_order(&self, id: TargetId) -> Vec<TargetId> {
    fn visit(graph: &TargetGraph, id: TargetId, seen: &mut HashSet<TargetId>, out: &mut Vec<TargetId>) {
      for dep in &graph.get(id).links {
        if seen.insert(*dep) {
          out.push(*dep);
          visit(graph, *dep, seen, out);
        }
      }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(self, id, &mut seen, &mut out);
    out
  }

  /// Include directories visible when compiling `id`.
  ///
  /// The target's own includes come first, then the public includes of every
  /// transitively linked target. Exact duplicates are dropped; the first
  /// occurrence keeps its position.
  pub fn resolve_includes(&self, id: TargetId) -> Vec<PathBuf> {
    let own = self.get(id).includes.iter();
    self.with_inherited_includes(id, own)
  }

  /// Include directories a target linking `id` inherits from it: the public
  /// includes of `id` itself, then those of everything it links.
  pub fn exported_includes(&self, id: TargetId) -> Vec<PathBuf> {
    let own = self.get(id).includes.iter().filter(|inc| inc.access == Access::Public);
    self.with_inherited_includes(id, own)
  }

  fn with_inherited_includes<'a>(&'a self, id: TargetId, own: impl Iterator<Item = &'a IncludeDir>) -> Vec<PathBuf> {
    let inherited = self
      .linked_pre_order(id)
      .into_iter()
      .flat_map(|dep| self.get(dep).includes.iter())
      .filter(|inc| inc.access == Access::Public);

    let mut seen = HashSet::new();
    own
      .chain(inherited)
      .map(|inc| &inc.path)
      .filter(|path| seen.insert(*path))
      .cloned()
      .collect()
  }

  /// Macros visible when compiling `id`.
  ///
  /// Public macros of linked targets are merged in dependency-declaration
  /// order with later writes winning; the target's own macros win over all
  /// inherited ones.
  pub fn resolve_macros(&self, id: TargetId) -> BTreeMap<String, MacroValue> {
    let mut resolved = BTreeMap::new();
    for dep in self.linked_post_order(id) {
      for def in &self.get(dep).macros {
        if def.access == Access::Public {
          resolved.insert(def.name.clone(), def.value.clone());
        }
      }
    }
    for def in &self.get(id).macros {
      resolved.insert(def.name.clone(), def.value.clone());
    }
    resolved
  }

  /// Libraries to hand to the linker for `id`, ordered so that every library
  /// precedes the libraries it depends on.
  pub fn link_closure(&self, id: TargetId) -> Vec<TargetId> {
    let mut order = self.linked_post_order(id);
    order.reverse();
    order
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::types::ExternalToolKind;

  fn src(name: &str) -> Vec<PathBuf> {
    vec![PathBuf::from(name)]
  }

  fn names(graph: &TargetGraph, ids: &[TargetId]) -> Vec<String> {
    ids.iter().map(|id| graph.get(*id).name.clone()).collect()
  }

  /// A <- B <- C, where C links B and B links A.
  fn chain() -> (TargetGraph, TargetId, TargetId, TargetId) {
    let mut graph = TargetGraph::new();
    let a = graph.add_library("a", src("a.c"), false).unwrap();
    let b = graph.add_library("b", src("b.c"), false).unwrap();
    let c = graph.add_executable("c", src("c.c")).unwrap();
    graph.target_links(b, &[a]).unwrap();
    graph.target_links(c, &[b]).unwrap();
    (graph, a, b, c)
  }

  #[test]
  fn duplicate_name_is_rejected() {
    let mut graph = TargetGraph::new();
    graph.add_library("noc", src("noc.c"), false).unwrap();
    let err = graph.add_executable("noc", src("main.c")).unwrap_err();
    assert_eq!(err, GraphError::DuplicateTarget("noc".to_string()));
    assert_eq!(graph.len(), 1);
  }

  #[test]
  fn native_targets_require_sources() {
    let mut graph = TargetGraph::new();
    let err = graph.add_library("empty", Vec::new(), false).unwrap_err();
    assert!(matches!(err, GraphError::InvalidDeclaration { .. }));
  }

  #[test]
  fn cycle_is_rejected_and_graph_unchanged() {
    let (mut graph, a, _b, c) = chain();
    let d = graph.add_library("d", src("d.c"), false).unwrap();
    graph.target_links(c, &[d]).unwrap();
    graph.target_links(d, &[a]).unwrap();

    let before_links = graph.get(a).links.clone();
    let before_edges = graph.graph.edge_count();

    // a -> d would close a -> d -> a.
    let err = graph.target_links(a, &[d]).unwrap_err();
    assert!(matches!(err, GraphError::CyclicDependency { .. }));
    assert_eq!(graph.get(a).links, before_links);
    assert_eq!(graph.graph.edge_count(), before_edges);
  }

  #[test]
  fn transitive_cycle_is_rejected() {
    let (mut graph, a, b, _c) = chain();
    let err = graph.target_links(a, &[b]).unwrap_err();
    assert_eq!(
      err,
      GraphError::CyclicDependency {
        from: "a".to_string(),
        to: "b".to_string()
      }
    );
  }

  #[test]
  fn self_link_is_a_cycle() {
    let mut graph = TargetGraph::new();
    let a = graph.add_library("a", src("a.c"), false).unwrap();
    assert!(matches!(
      graph.target_links(a, &[a]),
      Err(GraphError::CyclicDependency { .. })
    ));
  }

  #[test]
  fn rejected_batch_inserts_nothing() {
    let (mut graph, a, b, _c) = chain();
    let d = graph.add_library("d", src("d.c"), false).unwrap();
    // d is fine, b closes a cycle: neither may be inserted.
    assert!(graph.target_links(a, &[d, b]).is_err());
    assert!(graph.get(a).links.is_empty());
  }

  #[test]
  fn executables_and_packages_cannot_be_linked() {
    let (mut graph, a, _b, c) = chain();
    let pkg = graph.add_package("pkg", &[c]).unwrap();
    let lib = graph.add_library("lib", src("lib.c"), false).unwrap();

    assert!(matches!(graph.target_links(lib, &[c]), Err(GraphError::InvalidLink { .. })));
    assert!(matches!(graph.target_links(lib, &[pkg]), Err(GraphError::InvalidLink { .. })));
    assert!(matches!(
      graph.target_links(pkg, &[a]),
      Err(GraphError::InvalidDeclaration { .. })
    ));
  }

  #[test]
  fn public_attributes_propagate_transitively() {
    let (mut graph, a, b, c) = chain();
    graph
      .target_includes(a, Access::Public, [PathBuf::from("a/include")])
      .unwrap();
    graph.target_includes(a, Access::Private, [PathBuf::from("a/src")]).unwrap();
    graph
      .target_macros(a, Access::Public, [("A_PUBLIC".to_string(), MacroValue::Int(1))])
      .unwrap();
    graph
      .target_macros(a, Access::Private, [("A_PRIVATE".to_string(), MacroValue::Int(1))])
      .unwrap();

    let c_includes = graph.resolve_includes(c);
    assert_eq!(c_includes, vec![PathBuf::from("a/include")]);
    let c_macros = graph.resolve_macros(c);
    assert!(c_macros.contains_key("A_PUBLIC"));
    assert!(!c_macros.contains_key("A_PRIVATE"));

    // B sees the same through its direct link.
    assert_eq!(graph.resolve_includes(b), vec![PathBuf::from("a/include")]);

    // A sees both of its own.
    assert_eq!(
      graph.resolve_includes(a),
      vec![PathBuf::from("a/include"), PathBuf::from("a/src")]
    );
    let a_macros = graph.resolve_macros(a);
    assert!(a_macros.contains_key("A_PUBLIC"));
    assert!(a_macros.contains_key("A_PRIVATE"));
  }

  #[test]
  fn resolution_is_idempotent() {
    let (mut graph, a, b, c) = chain();
    graph.target_includes(a, Access::Public, [PathBuf::from("inc")]).unwrap();
    graph.target_includes(b, Access::Public, [PathBuf::from("inc")]).unwrap();
    graph
      .target_macros(b, Access::Public, [("B".to_string(), MacroValue::from("x"))])
      .unwrap();

    assert_eq!(graph.resolve_includes(c), graph.resolve_includes(c));
    assert_eq!(graph.resolve_macros(c), graph.resolve_macros(c));
    // Exact duplicates collapse.
    assert_eq!(graph.resolve_includes(c), vec![PathBuf::from("inc")]);
  }

  #[test]
  fn own_includes_come_first() {
    let (mut graph, a, _b, c) = chain();
    graph.target_includes(a, Access::Public, [PathBuf::from("a")]).unwrap();
    graph.target_includes(c, Access::Private, [PathBuf::from("c")]).unwrap();
    assert_eq!(graph.resolve_includes(c), vec![PathBuf::from("c"), PathBuf::from("a")]);
  }

  #[test]
  fn exported_includes_keep_what_dependencies_export() {
    let (mut graph, a, b, c) = chain();
    // `b` keeps "shared" private but `a` exports the same directory.
    graph.target_includes(a, Access::Public, [PathBuf::from("shared")]).unwrap();
    graph.target_includes(b, Access::Private, [PathBuf::from("shared"), PathBuf::from("b/src")]).unwrap();
    graph.target_includes(b, Access::Public, [PathBuf::from("b")]).unwrap();

    assert_eq!(graph.exported_includes(b), vec![PathBuf::from("b"), PathBuf::from("shared")]);
    assert_eq!(graph.exported_includes(c), vec![PathBuf::from("b"), PathBuf::from("shared")]);
    assert_eq!(graph.exported_includes(a), vec![PathBuf::from("shared")]);
  }

  #[test]
  fn macro_conflicts_resolve_last_write_wins() {
    let mut graph = TargetGraph::new();
    let first = graph.add_library("first", src("1.c"), false).unwrap();
    let second = graph.add_library("second", src("2.c"), false).unwrap();
    let app = graph.add_executable("app", src("main.c")).unwrap();
    graph
      .target_macros(first, Access::Public, [("LEVEL".to_string(), MacroValue::Int(1))])
      .unwrap();
    graph
      .target_macros(second, Access::Public, [("LEVEL".to_string(), MacroValue::Int(2))])
      .unwrap();
    graph.target_links(app, &[first, second]).unwrap();

    assert_eq!(graph.resolve_macros(app)["LEVEL"], MacroValue::Int(2));

    graph
      .target_macros(app, Access::Private, [("LEVEL".to_string(), MacroValue::Int(3))])
      .unwrap();
    assert_eq!(graph.resolve_macros(app)["LEVEL"], MacroValue::Int(3));
  }

  #[test]
  fn link_closure_orders_dependents_first() {
    //     app
    //    /   \
    //   b     c
    //    \   /
    //      a
    let mut graph = TargetGraph::new();
    let a = graph.add_library("a", src("a.c"), false).unwrap();
    let b = graph.add_library("b", src("b.c"), false).unwrap();
    let c = graph.add_library("c", src("c.c"), false).unwrap();
    let app = graph.add_executable("app", src("main.c")).unwrap();
    graph.target_links(b, &[a]).unwrap();
    graph.target_links(c, &[a]).unwrap();
    graph.target_links(app, &[b, c]).unwrap();

    let closure = names(&graph, &graph.link_closure(app));
    assert_eq!(closure, vec!["c", "b", "a"]);
  }

  #[test]
  fn waves_respect_dependencies() {
    let (mut graph, a, b, c) = chain();
    let other = graph.add_library("other", src("o.c"), false).unwrap();
    let pkg = graph.add_package("pkg", &[c, other]).unwrap();

    let waves = graph.waves().unwrap();
    let waves: Vec<Vec<String>> = waves.iter().map(|w| names(&graph, w)).collect();
    assert_eq!(
      waves,
      vec![
        vec!["a".to_string(), "other".to_string()],
        vec!["b".to_string()],
        vec!["c".to_string()],
        vec!["pkg".to_string()],
      ]
    );

    assert_eq!(graph.dependencies(pkg).len(), 2);
    assert_eq!(graph.dependencies(b), vec![a]);
    assert!(graph.dependencies(a).is_empty());
  }

  #[test]
  fn topological_order_visits_each_target_once() {
    let (graph, a, b, c) = chain();
    let order = graph.topological_order().unwrap();
    assert_eq!(order.len(), graph.len());
    let pos = |id| order.iter().position(|x| *x == id).unwrap();
    assert!(pos(a) < pos(b));
    assert!(pos(b) < pos(c));
  }

  #[test]
  fn externals_carry_their_spec() {
    let mut graph = TargetGraph::new();
    let glm = graph
      .add_external_library(
        "glm",
        ExternalSpec {
          location: PathBuf::from("glm"),
          tool: ExternalToolKind::CMake,
          artifact: Some(PathBuf::from("glm/glm.lib")),
          options: vec![("GLM_BUILD_TESTS".to_string(), "OFF".to_string())],
        },
      )
      .unwrap();
    graph.target_includes(glm, Access::Public, [PathBuf::from("glm")]).unwrap();

    let target = graph.get(glm);
    assert!(target.sources.is_empty());
    assert_eq!(target.external.as_ref().unwrap().tool, ExternalToolKind::CMake);
    assert!(matches!(
      graph.set_options(glm, TargetOptions::default()),
      Err(GraphError::InvalidDeclaration { .. })
    ));
  }
}
