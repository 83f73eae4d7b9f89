use std::collections::BTreeMap;

use cascade_schema::{DelayRange, DriverCategory, HazardType, RegionTag};
use petgraph::{
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
    Direction,
};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::catalog::DriverCatalog;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub hazard: Option<HazardType>,
    /// Set for primary drivers, `None` for effect nodes.
    pub category: Option<DriverCategory>,
}

impl GraphNode {
    pub fn is_driver(&self) -> bool {
        self.category.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CausalEdge {
    pub probability: f64,
    pub delay_min_days: f64,
    pub delay_max_days: f64,
    pub confidence: f64,
    pub uncertainty: f64,
    pub mechanism: String,
    pub regions: Vec<RegionTag>,
}

impl CausalEdge {
    fn new(
        probability: f64,
        delay: &DelayRange,
        confidence: f64,
        mechanism: &str,
        regions: &[RegionTag],
    ) -> Self {
        Self {
            probability,
            delay_min_days: delay.min_days(),
            delay_max_days: delay.max_days(),
            confidence,
            uncertainty: 1.0 - confidence,
            mechanism: mechanism.to_string(),
            regions: regions.to_vec(),
        }
    }

    pub fn delay_mean_days(&self) -> f64 {
        (self.delay_min_days + self.delay_max_days) / 2.0
    }

    /// Normal around the range midpoint with a quarter of the range as
    /// standard deviation, clamped at zero.
    pub fn sample_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let mean = self.delay_mean_days();
        let std_dev = (self.delay_max_days - self.delay_min_days) / 4.0;
        if std_dev <= 0.0 {
            return mean.max(0.0);
        }
        match Normal::new(mean, std_dev) {
            Ok(normal) => normal.sample(rng).max(0.0),
            Err(_) => mean.max(0.0),
        }
    }

    /// Bernoulli draw. When `perturb` is set the probability is jittered
    /// uniformly by up to `uncertainty * min(p, 1 - p)` either way, which
    /// keeps the expected activation rate at `p`.
    pub fn sample_activation<R: Rng + ?Sized>(&self, rng: &mut R, perturb: bool) -> bool {
        let p = self.probability;
        let effective = if perturb {
            let width = self.uncertainty * p.min(1.0 - p);
            if width > 0.0 {
                p + rng.gen_range(-width..width)
            } else {
                p
            }
        } else {
            p
        };
        rng.gen::<f64>() < effective
    }
}

/// Directed cascade graph over drivers and effects.
#[derive(Debug, Clone, Default)]
pub struct CausalGraph {
    graph: DiGraph<GraphNode, CausalEdge>,
    index: BTreeMap<String, NodeIndex>,
    outgoing: Vec<Vec<(NodeIndex, EdgeIndex)>>,
    incoming: Vec<Vec<(NodeIndex, EdgeIndex)>>,
}

impl CausalGraph {
    pub fn from_catalog(catalog: &DriverCatalog) -> Self {
        let mut graph = CausalGraph::default();

        for driver in &catalog.drivers {
            graph.ensure_node(&driver.id, &driver.name, None, Some(driver.category));
        }
        for driver in &catalog.drivers {
            let source = graph.index[&driver.id];
            for effect in &driver.effects {
                let target = graph.ensure_catalog_node(catalog, &effect.id);
                graph.graph.add_edge(
                    source,
                    target,
                    CausalEdge::new(
                        effect.probability,
                        &effect.delay,
                        effect.confidence,
                        &effect.mechanism,
                        &effect.regions,
                    ),
                );
            }
        }
        for link in &catalog.cross_links {
            let source = graph.ensure_catalog_node(catalog, &link.source);
            let target = graph.ensure_catalog_node(catalog, &link.target);
            graph.graph.add_edge(
                source,
                target,
                CausalEdge::new(
                    link.probability,
                    &link.delay,
                    link.confidence,
                    &link.mechanism,
                    &link.regions,
                ),
            );
        }

        graph.outgoing = graph
            .graph
            .node_indices()
            .map(|node| graph.sorted_neighbors(node, Direction::Outgoing))
            .collect();
        graph.incoming = graph
            .graph
            .node_indices()
            .map(|node| graph.sorted_neighbors(node, Direction::Incoming))
            .collect();

        tracing::debug!(
            target: "hazard_cascade::propagation",
            nodes = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            "graph.built"
        );
        graph
    }

    fn ensure_catalog_node(&mut self, catalog: &DriverCatalog, id: &str) -> NodeIndex {
        if let Some(index) = self.index.get(id) {
            return *index;
        }
        let (name, hazard) = catalog
            .node(id)
            .map(|info| (info.name.clone(), info.hazard))
            .unwrap_or_else(|| (id.to_string(), None));
        self.ensure_node(id, &name, hazard, None)
    }

    fn ensure_node(
        &mut self,
        id: &str,
        name: &str,
        hazard: Option<HazardType>,
        category: Option<DriverCategory>,
    ) -> NodeIndex {
        if let Some(index) = self.index.get(id) {
            return *index;
        }
        let index = self.graph.add_node(GraphNode {
            id: id.to_string(),
            name: name.to_string(),
            hazard,
            category,
        });
        self.index.insert(id.to_string(), index);
        index
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    pub fn edge(&self, index: EdgeIndex) -> &CausalEdge {
        &self.graph[index]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges ordered by target id so traversal order does not
    /// depend on insertion order.
    pub fn outgoing(&self, index: NodeIndex) -> &[(NodeIndex, EdgeIndex)] {
        &self.outgoing[index.index()]
    }

    pub fn incoming(&self, index: NodeIndex) -> &[(NodeIndex, EdgeIndex)] {
        &self.incoming[index.index()]
    }

    fn sorted_neighbors(
        &self,
        index: NodeIndex,
        direction: Direction,
    ) -> Vec<(NodeIndex, EdgeIndex)> {
        let mut edges: Vec<(NodeIndex, EdgeIndex)> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (other, edge.id())
            })
            .collect();
        edges.sort_by(|a, b| {
            self.graph[a.0]
                .id
                .cmp(&self.graph[b.0].id)
                .then_with(|| a.1.cmp(&b.1))
        });
        edges
    }
}
