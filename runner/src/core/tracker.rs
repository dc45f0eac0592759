//! Dependency tracking between test cases of one suite.
//!
//! Causal structure is reconstructed purely from reference flow: a test that
//! consumes `$x` depends on the earlier test that created `$x`, and on
//! everything that test depended on. On top of that, a few methods are known
//! to touch handler-global state. References they create are *stateful*, and
//! any test reaching a stateful reference inherits the cumulative set of
//! state-mutating tests seen so far.
//!
//! State only grows. It is never rolled back when a handler process is
//! replaced, because test order (not process identity) defines dependencies.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::protocol::TestCase;

/// Method classification used by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Methods whose created references also carry ambient global state.
    pub stateful_creators: BTreeSet<String>,
    /// Methods that mutate handler-global state.
    pub state_mutators: BTreeSet<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stateful_creators: [
                "btck_context_create",
                "btck_chainstate_manager_create",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            state_mutators: ["btck_chainstate_manager_process_block"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Defects in the suite data itself. These are fatal for a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error(
        "test {index} ({test_id}) uses undefined reference {reference}: no prior test created it"
    )]
    UndefinedReference {
        index: usize,
        test_id: String,
        reference: String,
    },
}

#[derive(Debug, Default)]
pub struct DependencyTracker {
    config: TrackerConfig,
    /// Reference name -> index of the test that created it.
    ref_creators: HashMap<String, usize>,
    stateful_refs: HashSet<String>,
    /// Test index -> ascending, duplicate-free dependency chain.
    dep_chains: BTreeMap<usize, Vec<usize>>,
    /// Cumulative state-mutating tests plus their chains.
    state_dependencies: Vec<usize>,
}

impl DependencyTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Record the transitive dependency chain for test `index`.
    ///
    /// Must run after every earlier test has gone through
    /// [`on_test_executed`](Self::on_test_executed). A consumed reference with
    /// no known creator is a suite-authoring defect.
    pub fn build_dependencies_for_test(
        &mut self,
        index: usize,
        test: &TestCase,
    ) -> Result<&[usize], TrackerError> {
        let mut chain = BTreeSet::new();
        for reference in test.consumed_refs() {
            let Some(&creator) = self.ref_creators.get(reference) else {
                return Err(TrackerError::UndefinedReference {
                    index,
                    test_id: test.request.id.clone(),
                    reference: reference.to_string(),
                });
            };
            chain.insert(creator);
            if let Some(parent) = self.dep_chains.get(&creator) {
                chain.extend(parent.iter().copied());
            }
        }
        self.dep_chains.insert(index, chain.into_iter().collect());
        Ok(self.dependency_chain(index))
    }

    /// Register what test `index` produced once it has run (pass or fail).
    pub fn on_test_executed(&mut self, index: usize, test: &TestCase) {
        if let Some(reference) = test.created_ref() {
            self.ref_creators.insert(reference.to_string(), index);
            if self.config.stateful_creators.contains(&test.request.method) {
                self.stateful_refs.insert(reference.to_string());
            }
        }

        if self.config.state_mutators.contains(&test.request.method) {
            let own = [index];
            self.state_dependencies = merge_sorted_unique(&[
                self.state_dependencies.as_slice(),
                self.dependency_chain(index),
                own.as_slice(),
            ]);
        }
    }

    /// Chain of prior requests needed to replay test `index`.
    ///
    /// Equal to the dependency chain unless the test (or anything in its chain)
    /// consumes a stateful reference, in which case the state dependencies
    /// recorded before `index` are merged in. Never contains `index` itself.
    pub fn build_request_chain(&self, index: usize, tests: &[TestCase]) -> Vec<usize> {
        let chain = self.dependency_chain(index);
        if self.uses_stateful_refs(index, tests) {
            let earlier = self.state_dependencies.partition_point(|&i| i < index);
            merge_sorted_unique(&[chain, &self.state_dependencies[..earlier]])
        } else {
            chain.to_vec()
        }
    }

    /// Dependency chain recorded for test `index` (empty if unknown).
    pub fn dependency_chain(&self, index: usize) -> &[usize] {
        self.dep_chains.get(&index).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn state_dependencies(&self) -> &[usize] {
        &self.state_dependencies
    }

    pub fn is_stateful_ref(&self, reference: &str) -> bool {
        self.stateful_refs.contains(reference)
    }

    pub fn creator_of(&self, reference: &str) -> Option<usize> {
        self.ref_creators.get(reference).copied()
    }

    fn uses_stateful_refs(&self, index: usize, tests: &[TestCase]) -> bool {
        self.dependency_chain(index)
            .iter()
            .chain(std::iter::once(&index))
            .filter_map(|&i| tests.get(i))
            .flat_map(TestCase::consumed_refs)
            .any(|reference| self.is_stateful_ref(reference))
    }
}

/// Sorted union of index lists, without duplicates.
pub fn merge_sorted_unique(chains: &[&[usize]]) -> Vec<usize> {
    chains
        .iter()
        .flat_map(|chain| chain.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
