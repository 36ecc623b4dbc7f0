// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::task::{MapTask, ReduceTask, TaskOutputs, WorkerId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// Coarse progress of the whole job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Map,
    Reduce,
    Done,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Map => f.write_str("map"),
            JobPhase::Reduce => f.write_str("reduce"),
            JobPhase::Done => f.write_str("done"),
        }
    }
}

/// Authoritative record of which work is pending, in flight and done.
///
/// Invariants:
/// - a file is either pending or in flight, never both
/// - a bucket is held by at most one worker at a time
/// - reduce buckets are released exactly once, when no map input is pending
///   or in flight, and only non-empty buckets become reduce tasks
///
/// The pool has no locking of its own; the coordinator owns it.
#[derive(Debug)]
pub struct TaskPool {
    reducer_count: usize,
    pending_map_inputs: VecDeque<String>,
    map_in_flight: IndexMap<String, WorkerId>,
    reduce_buckets: Vec<Vec<String>>,
    pending_reduce_buckets: VecDeque<usize>,
    reduce_in_flight: IndexMap<usize, WorkerId>,
    reduce_released: bool,
    completed_maps: usize,
    completed_reduces: usize,
}

impl TaskPool {
    /// Inputs keep their order; repeated identifiers are collapsed to the first occurrence.
    pub fn new<I, S>(inputs: I, reducer_count: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut pending_map_inputs = VecDeque::new();
        for input in inputs {
            let input = input.into();
            if seen.insert(input.clone()) {
                pending_map_inputs.push_back(input);
            } else {
                warn!(file = %input, "duplicate input file ignored");
            }
        }

        let mut pool = Self {
            reducer_count,
            pending_map_inputs,
            map_in_flight: IndexMap::new(),
            reduce_buckets: vec![Vec::new(); reducer_count],
            pending_reduce_buckets: VecDeque::new(),
            reduce_in_flight: IndexMap::new(),
            reduce_released: false,
            completed_maps: 0,
            completed_reduces: 0,
        };
        pool.release_reduce_buckets();
        pool
    }

    pub fn reducer_count(&self) -> usize {
        self.reducer_count
    }

    /// Hand the next pending input to `worker`
    pub fn take_map(&mut self, worker: WorkerId) -> Option<MapTask> {
        let file = self.pending_map_inputs.pop_front()?;
        self.map_in_flight.insert(file.clone(), worker);
        Some(MapTask {
            file,
            reducer_count: self.reducer_count,
        })
    }

    /// Record a finished map. Returns false, changing nothing, unless `file` is
    /// currently in flight against `worker`.
    pub fn complete_map(&mut self, worker: WorkerId, file: &str, outputs: &TaskOutputs) -> bool {
        if self.map_in_flight.get(file) != Some(&worker) {
            return false;
        }
        self.map_in_flight.shift_remove(file);
        self.completed_maps += 1;

        for (&reducer, locators) in outputs {
            let Some(bucket) = self.reduce_buckets.get_mut(reducer) else {
                warn!(
                    file,
                    reducer,
                    reducer_count = self.reducer_count,
                    "map output for unknown reducer dropped"
                );
                continue;
            };
            for locator in locators {
                if !bucket.contains(locator) {
                    bucket.push(locator.clone());
                }
            }
        }

        self.release_reduce_buckets();
        true
    }

    /// Put an in-flight file back at the head of the queue
    pub fn requeue_map(&mut self, worker: WorkerId, file: &str) -> bool {
        if self.map_in_flight.get(file) != Some(&worker) {
            return false;
        }
        self.map_in_flight.shift_remove(file);
        self.pending_map_inputs.push_front(file.to_string());
        true
    }

    /// Hand the next released bucket to `worker`. Always `None` before the barrier.
    pub fn take_reduce(&mut self, worker: WorkerId) -> Option<ReduceTask> {
        if !self.reduce_released {
            return None;
        }
        let bucket = self.pending_reduce_buckets.pop_front()?;
        self.reduce_in_flight.insert(bucket, worker);
        Some(ReduceTask {
            bucket,
            inputs: self.reduce_buckets[bucket].clone(),
        })
    }

    pub fn complete_reduce(&mut self, worker: WorkerId, bucket: usize) -> bool {
        if self.reduce_in_flight.get(&bucket) != Some(&worker) {
            return false;
        }
        self.reduce_in_flight.shift_remove(&bucket);
        self.completed_reduces += 1;
        true
    }

    pub fn requeue_reduce(&mut self, worker: WorkerId, bucket: usize) -> bool {
        if self.reduce_in_flight.get(&bucket) != Some(&worker) {
            return false;
        }
        self.reduce_in_flight.shift_remove(&bucket);
        self.pending_reduce_buckets.push_front(bucket);
        true
    }

    /// No map input pending or in flight
    pub fn map_phase_drained(&self) -> bool {
        self.pending_map_inputs.is_empty() && self.map_in_flight.is_empty()
    }

    pub fn phase(&self) -> JobPhase {
        if !self.reduce_released {
            JobPhase::Map
        } else if self.pending_reduce_buckets.is_empty() && self.reduce_in_flight.is_empty() {
            JobPhase::Done
        } else {
            JobPhase::Reduce
        }
    }

    fn release_reduce_buckets(&mut self) {
        if self.reduce_released || !self.map_phase_drained() {
            return;
        }
        self.pending_reduce_buckets = self
            .reduce_buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(index, _)| index)
            .collect();
        self.reduce_released = true;
        debug!(
            buckets = self.pending_reduce_buckets.len(),
            "map phase drained, reduce buckets released"
        );
    }

    pub fn pending_map_inputs(&self) -> impl Iterator<Item = &str> {
        self.pending_map_inputs.iter().map(String::as_str)
    }

    pub fn map_owner(&self, file: &str) -> Option<WorkerId> {
        self.map_in_flight.get(file).copied()
    }

    pub fn maps_in_flight(&self) -> usize {
        self.map_in_flight.len()
    }

    pub fn bucket(&self, index: usize) -> Option<&[String]> {
        self.reduce_buckets.get(index).map(Vec::as_slice)
    }

    pub fn pending_reduce_buckets(&self) -> impl Iterator<Item = usize> + '_ {
        self.pending_reduce_buckets.iter().copied()
    }

    pub fn reduce_owner(&self, bucket: usize) -> Option<WorkerId> {
        self.reduce_in_flight.get(&bucket).copied()
    }

    pub fn reduces_in_flight(&self) -> usize {
        self.reduce_in_flight.len()
    }

    pub fn completed_maps(&self) -> usize {
        self.completed_maps
    }

    pub fn completed_reduces(&self) -> usize {
        self.completed_reduces
    }
}
