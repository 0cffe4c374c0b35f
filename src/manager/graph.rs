//! Flattened dependency graph of one added spec.

use crate::config::ManagerConfig;
use crate::plugin::{PluginInfo, PluginSpec};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub spec: PluginSpec,
    pub info: PluginInfo,
    /// Node that first declared this one; `None` for the root.
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Some ancestor is lazy, so this node loads with it.
    pub deferred: bool,
}

/// Nodes are stored in discovery (pre-)order; index 0 is the root and every
/// parent precedes its children. A URL appears once even when several specs
/// in the tree depend on it.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    /// Resolves every spec in the tree and rejects dependency cycles.
    pub fn build(root: &PluginSpec, config: &ManagerConfig) -> Result<Self> {
        let mut graph = Self { nodes: Vec::new() };
        let mut stack = Vec::new();
        graph.visit(root, None, false, &mut stack, config)?;
        Ok(graph)
    }

    fn visit(
        &mut self,
        spec: &PluginSpec,
        parent: Option<usize>,
        deferred: bool,
        stack: &mut Vec<String>,
        config: &ManagerConfig,
    ) -> Result<usize> {
        let info = PluginInfo::resolve(spec, &config.base, &config.default_host)?;

        if stack.contains(&info.url) {
            let mut chain = stack.clone();
            chain.push(info.url);
            return Err(Error::DependencyCycle { chain });
        }
        if let Some(existing) = self.position(&info.url) {
            return Ok(existing);
        }

        let idx = self.nodes.len();
        stack.push(info.url.clone());
        self.nodes.push(GraphNode {
            spec: spec.clone(),
            info,
            parent,
            children: Vec::new(),
            deferred,
        });

        let child_deferred = deferred || spec.is_lazy();
        for dependency in &spec.dependencies {
            let child = self.visit(dependency, Some(idx), child_deferred, stack, config)?;
            if !self.nodes[idx].children.contains(&child) {
                self.nodes[idx].children.push(child);
            }
        }
        stack.pop();
        Ok(idx)
    }

    fn position(&self, url: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.info.url == url)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn root(&self) -> &GraphNode {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependencies before dependents; the root is last.
    pub fn install_order(&self) -> Vec<usize> {
        fn walk(graph: &DependencyGraph, idx: usize, seen: &mut [bool], out: &mut Vec<usize>) {
            if seen[idx] {
                return;
            }
            seen[idx] = true;
            for &child in &graph.nodes[idx].children {
                walk(graph, child, seen, out);
            }
            out.push(idx);
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::with_capacity(self.nodes.len());
        if !self.nodes.is_empty() {
            walk(self, 0, &mut seen, &mut out);
        }
        out
    }
}
