//! Implementation of the `kiln graph` command.
//!
//! Prints every target in the order the build driver would schedule it,
//! with its kind, direct links and the include directories it exports.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde_json::json;

use kiln_lib::target::{TargetGraph, TargetId};

use crate::ProjectArgs;
use crate::output::{OutputFormat, print_json, print_stat};

struct Entry<'a> {
  name: &'a str,
  kind: &'static str,
  links: Vec<&'a str>,
  public_includes: Vec<String>,
}

fn entry(graph: &TargetGraph, id: TargetId) -> Entry<'_> {
  let target = graph.get(id);
  Entry {
    name: &target.name,
    kind: target.kind.as_str(),
    links: graph
      .dependencies(id)
      .into_iter()
      .map(|dep| graph.get(dep).name.as_str())
      .collect(),
    public_includes: graph
      .exported_includes(id)
      .iter()
      .map(|path| path.display().to_string())
      .collect(),
  }
}

pub fn cmd_graph(args: &ProjectArgs, output: OutputFormat) -> Result<()> {
  let project = super::load(args)?;
  let graph = &project.graph;
  let order = graph.topological_order().context("target graph cannot be ordered")?;
  let entries: Vec<_> = order.into_iter().map(|id| entry(graph, id)).collect();

  if output.is_json() {
    let targets: Vec<_> = entries
      .iter()
      .map(|e| json!({ "name": e.name, "kind": e.kind, "links": e.links, "public_includes": e.public_includes }))
      .collect();
    return print_json(&json!({ "build_type": args.build_type, "targets": targets }));
  }

  for e in &entries {
    println!(
      "{} {}",
      e.name.if_supports_color(Stream::Stdout, |s| s.bold()),
      format!("({})", e.kind).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    if !e.links.is_empty() {
      print_stat("links", &e.links.join(", "));
    }
    for include in &e.public_includes {
      print_stat("include", include);
    }
  }
  Ok(())
}
