//! Deterministic depth-bounded cascade traversal.
//!
//! Both directions use an explicit worklist. A node may appear once per
//! path, so cycles in the catalog terminate, while the same node reached
//! along different paths yields one result per path.

use std::collections::{BTreeMap, VecDeque};

use cascade_schema::{
    CausalPath, CauseReport, DriverCategory, EffectStatus, ExpectedTiming, PredictedEffect,
    RegionTag,
};
use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::{
    cancellation::CancellationToken, engine_config::PropagationConfig, error::EngineError,
    graph::CausalGraph,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    pub predictions: Vec<PredictedEffect>,
    /// Expansion cap or cancellation stopped the traversal early.
    pub truncated: bool,
    pub expansions: usize,
}

#[derive(Debug, Clone)]
struct Frame {
    node: NodeIndex,
    depth: u32,
    probability: f64,
    confidence: f64,
    delay_min: f64,
    delay_max: f64,
    path: Vec<NodeIndex>,
    regions: Vec<RegionTag>,
}

pub fn propagate(
    graph: &CausalGraph,
    trigger: &str,
    max_depth: u32,
    config: &PropagationConfig,
    token: Option<&CancellationToken>,
) -> Result<Propagation, EngineError> {
    let start = graph
        .index_of(trigger)
        .ok_or_else(|| EngineError::node_not_found(trigger))?;

    let mut worklist = VecDeque::new();
    worklist.push_back(Frame {
        node: start,
        depth: 0,
        probability: 1.0,
        confidence: 1.0,
        delay_min: 0.0,
        delay_max: 0.0,
        path: vec![start],
        regions: Vec::new(),
    });

    let mut predictions = Vec::new();
    let mut expansions = 0usize;
    let mut truncated = false;

    while let Some(frame) = worklist.pop_front() {
        if expansions >= config.max_expansions || token.map_or(false, |t| t.is_cancelled()) {
            truncated = true;
            break;
        }
        expansions += 1;

        if frame.depth + 1 > max_depth {
            continue;
        }

        for &(target, edge_index) in graph.outgoing(frame.node) {
            if frame.path.contains(&target) {
                continue;
            }
            let edge = graph.edge(edge_index);
            let probability = frame.probability * edge.probability;
            if probability < config.probability_floor {
                continue;
            }
            let confidence = frame.confidence * edge.confidence;
            let delay_min = frame.delay_min + edge.delay_min_days;
            let delay_max = frame.delay_max + edge.delay_max_days;
            let regions = if edge.regions.is_empty() {
                frame.regions.clone()
            } else {
                edge.regions.clone()
            };
            let mut path = frame.path.clone();
            path.push(target);
            let depth = frame.depth + 1;

            let ids: Vec<String> = path.iter().map(|n| graph.node(*n).id.clone()).collect();
            let node = graph.node(target);
            predictions.push(PredictedEffect {
                id: ids.join(">"),
                trigger_event_id: None,
                trigger_driver_id: trigger.to_string(),
                effect_id: node.id.clone(),
                effect_name: node.name.clone(),
                hazard: node.hazard,
                probability,
                confidence,
                timing: ExpectedTiming::from_days(delay_min, delay_max),
                regions: regions.clone(),
                mechanism: edge.mechanism.clone(),
                path: ids,
                depth,
                low_confidence: confidence < config.low_confidence_threshold,
                status: EffectStatus::Predicted,
            });

            worklist.push_back(Frame {
                node: target,
                depth,
                probability,
                confidence,
                delay_min,
                delay_max,
                path,
                regions,
            });
        }
    }

    sort_predictions(&mut predictions);

    if truncated {
        tracing::warn!(
            target: "hazard_cascade::propagation",
            trigger,
            expansions,
            "propagation.truncated"
        );
    }
    tracing::debug!(
        target: "hazard_cascade::propagation",
        trigger,
        max_depth,
        predictions = predictions.len(),
        "propagation.completed"
    );

    Ok(Propagation {
        predictions,
        truncated,
        expansions,
    })
}

/// Probability descending, then shallower first, then path key.
pub fn sort_predictions(predictions: &mut [PredictedEffect]) {
    predictions.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.depth.cmp(&b.depth))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[derive(Debug, Clone)]
struct ReverseFrame {
    node: NodeIndex,
    probability: f64,
    /// Walked from the effect back toward drivers.
    path: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
}

/// Every driver-rooted path of at most `max_depth` edges that ends at
/// `effect`, ranked like forward predictions and grouped by category.
pub fn get_all_causes(
    graph: &CausalGraph,
    effect: &str,
    max_depth: u32,
    config: &PropagationConfig,
    token: Option<&CancellationToken>,
) -> Result<CauseReport, EngineError> {
    let start = graph
        .index_of(effect)
        .ok_or_else(|| EngineError::node_not_found(effect))?;

    let mut worklist = VecDeque::new();
    worklist.push_back(ReverseFrame {
        node: start,
        probability: 1.0,
        path: vec![start],
        edges: Vec::new(),
    });

    let mut paths = Vec::new();
    let mut expansions = 0usize;
    let mut truncated = false;

    while let Some(frame) = worklist.pop_front() {
        if expansions >= config.max_expansions || token.map_or(false, |t| t.is_cancelled()) {
            truncated = true;
            break;
        }
        expansions += 1;

        if frame.edges.len() as u32 + 1 > max_depth {
            continue;
        }

        for &(source, edge_index) in graph.incoming(frame.node) {
            if frame.path.contains(&source) {
                continue;
            }
            let probability = frame.probability * graph.edge(edge_index).probability;
            if probability < config.probability_floor {
                continue;
            }
            let mut path = frame.path.clone();
            path.push(source);
            let mut edges = frame.edges.clone();
            edges.push(edge_index);

            if let Some(category) = graph.node(source).category {
                paths.push(causal_path(graph, &path, &edges, category));
            }

            worklist.push_back(ReverseFrame {
                node: source,
                probability,
                path,
                edges,
            });
        }
    }

    paths.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.nodes.len().cmp(&b.nodes.len()))
            .then_with(|| a.nodes.cmp(&b.nodes))
    });

    let mut by_category: BTreeMap<DriverCategory, Vec<CausalPath>> = BTreeMap::new();
    for path in &paths {
        by_category
            .entry(path.category)
            .or_default()
            .push(path.clone());
    }

    if truncated {
        tracing::warn!(
            target: "hazard_cascade::propagation",
            effect,
            expansions,
            "causes.truncated"
        );
    }

    Ok(CauseReport {
        effect_id: effect.to_string(),
        effect_name: graph.node(start).name.clone(),
        paths,
        by_category,
        truncated,
    })
}

/// Builds the driver-first path. Probability and confidence are multiplied
/// in forward order so the result matches the forward traversal bit for bit.
fn causal_path(
    graph: &CausalGraph,
    reversed_nodes: &[NodeIndex],
    reversed_edges: &[EdgeIndex],
    category: DriverCategory,
) -> CausalPath {
    let mut probability = 1.0;
    let mut confidence = 1.0;
    let mut delay_min = 0.0;
    let mut delay_max = 0.0;
    for edge_index in reversed_edges.iter().rev() {
        let edge = graph.edge(*edge_index);
        probability *= edge.probability;
        confidence *= edge.confidence;
        delay_min += edge.delay_min_days;
        delay_max += edge.delay_max_days;
    }
    let nodes: Vec<String> = reversed_nodes
        .iter()
        .rev()
        .map(|index| graph.node(*index).id.clone())
        .collect();
    let driver = graph.node(reversed_nodes[reversed_nodes.len() - 1]);
    CausalPath {
        driver_id: driver.id.clone(),
        driver_name: driver.name.clone(),
        category,
        nodes,
        probability,
        confidence,
        timing: ExpectedTiming::from_days(delay_min, delay_max),
    }
}
