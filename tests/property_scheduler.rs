// tests/property_scheduler.rs

mod common;
use crate::common::{run_scripted, ConfigFileBuilder, ScriptedMetrics, ScriptedSupervisor};

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use procdag::config::ConfigFile;
use procdag::engine::RunReport;

// We ensure acyclicity by only allowing node N to depend on nodes 0..N-1.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_nodes).prop_flat_map(|num_nodes| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_nodes),
            num_nodes,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    let mut valid: Vec<usize> = if i == 0 {
                        Vec::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    };
                    valid.sort_unstable();
                    valid.dedup();
                    valid
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("node_{i:02}")
}

fn build_config(deps: &[Vec<usize>]) -> ConfigFile {
    let mut builder = ConfigFileBuilder::new();
    for (i, prereqs) in deps.iter().enumerate() {
        let prereqs: Vec<String> = prereqs.iter().map(|&d| name(d)).collect();
        let refs: Vec<&str> = prereqs.iter().map(String::as_str).collect();
        builder = builder.node(&name(i), &refs);
    }
    builder.build()
}

fn run(deps: &[Vec<usize>], polls: &[u32], failing: &HashSet<usize>) -> RunReport {
    let cfg = build_config(deps);
    let mut supervisor = ScriptedSupervisor::new();
    for i in 0..deps.len() {
        supervisor = supervisor.polls(&name(i), polls.get(i).copied().unwrap_or(0));
        if failing.contains(&i) {
            supervisor = supervisor.exit_code(&name(i), Some(1));
        }
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    rt.block_on(run_scripted(&cfg, supervisor, ScriptedMetrics::idle()))
}

proptest! {
    #[test]
    fn successful_runs_complete_in_topological_order(
        deps in dag_strategy(12),
        polls in proptest::collection::vec(0u32..4, 12),
    ) {
        let report = run(&deps, &polls, &HashSet::new());
        prop_assert!(report.is_success(), "status: {:?}", report.status);
        prop_assert_eq!(report.completion_order.len(), deps.len());

        let position: HashMap<&str, usize> = report
            .completion_order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let launched: HashMap<&str, usize> = report
            .launch_order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        for (i, prereqs) in deps.iter().enumerate() {
            let node = name(i);
            for &p in prereqs {
                let prereq = name(p);
                prop_assert!(position[prereq.as_str()] < position[node.as_str()]);
                prop_assert!(launched[prereq.as_str()] < launched[node.as_str()]);
            }
        }
    }

    #[test]
    fn runs_are_deterministic(
        deps in dag_strategy(10),
        polls in proptest::collection::vec(0u32..3, 10),
    ) {
        let first = run(&deps, &polls, &HashSet::new());
        let second = run(&deps, &polls, &HashSet::new());
        prop_assert_eq!(first.launch_order, second.launch_order);
        prop_assert_eq!(first.completion_order, second.completion_order);
    }

    #[test]
    fn every_node_is_accounted_for_after_failures(
        deps in dag_strategy(10),
        polls in proptest::collection::vec(0u32..3, 10),
        failing in proptest::collection::hash_set(0usize..10, 1..3),
    ) {
        let report = run(&deps, &polls, &failing);
        let launched: HashSet<&str> = report.launch_order.iter().map(String::as_str).collect();

        // Each node is launched at most once, and exactly the launched ones
        // are missing from `never_launched`.
        prop_assert_eq!(launched.len(), report.launch_order.len());
        prop_assert_eq!(launched.len() + report.never_launched.len(), deps.len());

        let failed_declared = failing.iter().any(|&i| i < deps.len());
        prop_assert_eq!(report.is_success(), !failed_declared);

        // A node downstream of a failed node never starts.
        for (i, prereqs) in deps.iter().enumerate() {
            for &p in prereqs {
                if report.failed.contains(&name(p)) {
                    prop_assert!(!launched.contains(name(i).as_str()));
                }
            }
        }
    }
}
