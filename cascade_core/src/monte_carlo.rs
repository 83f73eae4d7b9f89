//! Stochastic cascade simulation.
//!
//! Trials are split into a fixed number of partitions. Each partition runs
//! on rayon with its own ChaCha8 stream and accumulators; partitions are
//! merged in index order, so a given seed and partition count always
//! produce the same summary regardless of thread scheduling.

use std::collections::{BTreeMap, VecDeque};

use cascade_schema::{DistributionSummary, SimulationSummary};
use petgraph::graph::NodeIndex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::{
    cancellation::CancellationToken, engine_config::SimulationConfig, error::EngineError,
    graph::CausalGraph, hashing::task_seed,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    pub trigger: String,
    pub trials: u64,
    /// Falls back to the configured seed.
    pub seed: Option<u64>,
}

impl SimulationRequest {
    pub fn new(trigger: impl Into<String>, trials: u64) -> Self {
        Self {
            trigger: trigger.into(),
            trials,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Default)]
struct TaskAccumulator {
    completed: u64,
    truncated: bool,
    delays: BTreeMap<NodeIndex, Vec<f64>>,
}

impl TaskAccumulator {
    fn merge(&mut self, other: TaskAccumulator) {
        self.completed += other.completed;
        self.truncated |= other.truncated;
        for (node, mut delays) in other.delays {
            self.delays.entry(node).or_default().append(&mut delays);
        }
    }
}

pub fn simulate(
    graph: &CausalGraph,
    request: &SimulationRequest,
    config: &SimulationConfig,
    token: &CancellationToken,
) -> Result<SimulationSummary, EngineError> {
    let start = graph
        .index_of(&request.trigger)
        .ok_or_else(|| EngineError::node_not_found(&request.trigger))?;
    let seed = request.seed.unwrap_or(config.seed);
    let partitions = partition_trials(request.trials, config.task_count.max(1));
    let check_interval = config.check_interval.max(1);

    let results: Vec<TaskAccumulator> = partitions
        .par_iter()
        .enumerate()
        .map(|(task_index, &trials)| {
            let mut rng =
                ChaCha8Rng::seed_from_u64(task_seed(seed, &request.trigger, task_index as u64));
            run_partition(
                graph,
                start,
                trials,
                config.perturb_activation,
                check_interval,
                token,
                &mut rng,
            )
        })
        .collect();

    let mut merged = TaskAccumulator::default();
    for result in results {
        merged.merge(result);
    }

    let mut effects = BTreeMap::new();
    for (node, mut delays) in merged.delays {
        let info = graph.node(node);
        effects.insert(
            info.id.clone(),
            summarize(&info.id, &info.name, &mut delays, merged.completed),
        );
    }

    let truncated = merged.truncated || merged.completed < request.trials;
    if truncated {
        tracing::warn!(
            target: "hazard_cascade::monte_carlo",
            trigger = %request.trigger,
            requested = request.trials,
            completed = merged.completed,
            "monte_carlo.truncated"
        );
    }
    tracing::debug!(
        target: "hazard_cascade::monte_carlo",
        trigger = %request.trigger,
        trials = merged.completed,
        seed,
        effects = effects.len(),
        "monte_carlo.completed"
    );

    Ok(SimulationSummary {
        trigger_driver_id: request.trigger.clone(),
        trials_requested: request.trials,
        trials_completed: merged.completed,
        seed,
        truncated,
        effects,
    })
}

fn partition_trials(trials: u64, partitions: usize) -> Vec<u64> {
    let partitions = partitions as u64;
    let base = trials / partitions;
    let remainder = trials % partitions;
    (0..partitions)
        .map(|index| base + u64::from(index < remainder))
        .collect()
}

fn run_partition(
    graph: &CausalGraph,
    start: NodeIndex,
    trials: u64,
    perturb: bool,
    check_interval: u64,
    token: &CancellationToken,
    rng: &mut ChaCha8Rng,
) -> TaskAccumulator {
    let mut accumulator = TaskAccumulator::default();
    let mut triggered = vec![false; graph.node_count()];
    let mut touched: Vec<NodeIndex> = Vec::new();
    let mut queue: VecDeque<(NodeIndex, f64)> = VecDeque::new();

    for trial in 0..trials {
        if trial % check_interval == 0 && token.is_cancelled() {
            accumulator.truncated = true;
            break;
        }

        for node in touched.drain(..) {
            triggered[node.index()] = false;
        }
        triggered[start.index()] = true;
        touched.push(start);
        queue.push_back((start, 0.0));

        while let Some((node, elapsed)) = queue.pop_front() {
            for &(target, edge_index) in graph.outgoing(node) {
                if triggered[target.index()] {
                    continue;
                }
                let edge = graph.edge(edge_index);
                if !edge.sample_activation(rng, perturb) {
                    continue;
                }
                let arrival = elapsed + edge.sample_delay(rng);
                triggered[target.index()] = true;
                touched.push(target);
                accumulator.delays.entry(target).or_default().push(arrival);
                queue.push_back((target, arrival));
            }
        }

        accumulator.completed += 1;
    }

    accumulator
}

fn summarize(
    id: &str,
    name: &str,
    delays: &mut [f64],
    completed: u64,
) -> DistributionSummary {
    delays.sort_by(f64::total_cmp);
    let count = delays.len();
    let mean = delays.iter().sum::<f64>() / count.max(1) as f64;
    let variance = delays
        .iter()
        .map(|delay| (delay - mean).powi(2))
        .sum::<f64>()
        / count.max(1) as f64;
    DistributionSummary {
        effect_id: id.to_string(),
        effect_name: name.to_string(),
        probability: if completed == 0 {
            0.0
        } else {
            count as f64 / completed as f64
        },
        triggered_trials: count as u64,
        mean_delay_days: mean,
        std_delay_days: variance.sqrt(),
        p10_delay_days: percentile(delays, 0.10),
        p90_delay_days: percentile(delays, 0.90),
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() - 1) as f64 * quantile).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
