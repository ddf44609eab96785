//! Wait-for graph construction and periodic deadlock detection.
//!
//! Each pass rebuilds the graph from the live lock queues, aborts the
//! youngest transaction on every cycle, wakes all waiters so victims can
//! unwind, and discards the graph.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use log::info;

use crate::common::types::TxnId;
use crate::transaction::lock::{LockManager, LockRequestQueue};
use crate::transaction::transaction::TransactionState;

impl LockManager {
    /// Build the wait-for graph: an edge `waiter -> holder` for every
    /// incompatible (ungranted, granted) pair in any queue. Adjacency
    /// lists come out sorted ascending.
    pub fn build_wait_for_graph(&self) -> BTreeMap<TxnId, Vec<TxnId>> {
        let mut graph: BTreeMap<TxnId, Vec<TxnId>> = BTreeMap::new();

        for queue in self.all_queues() {
            let q = queue.inner.lock();
            for waiter in q.requests.iter().filter(|r| !r.granted) {
                for holder in q.requests.iter().filter(|r| r.granted) {
                    if waiter.txn_id != holder.txn_id
                        && !holder.mode.is_compatible_with(&waiter.mode)
                    {
                        let edges = graph.entry(waiter.txn_id).or_default();
                        if !edges.contains(&holder.txn_id) {
                            edges.push(holder.txn_id);
                        }
                    }
                }
            }
        }

        for edges in graph.values_mut() {
            edges.sort_unstable();
        }
        graph
    }

    /// One detection pass: abort the largest txn id on every cycle until
    /// the graph is cycle-free. Returns the victims.
    pub fn run_detection_pass(&self) -> Vec<TxnId> {
        let mut graph = self.build_wait_for_graph();
        let mut victims = Vec::new();

        while let Some(cycle) = Self::find_cycle(&graph) {
            let victim = *cycle.iter().max().expect("cycle is non-empty");
            info!("deadlock detected, aborting transaction {} (cycle {:?})", victim, cycle);

            if let Some(txn) = self.txn_manager.get_transaction(victim) {
                txn.set_state(TransactionState::Aborted);
            }

            graph.remove(&victim);
            for edges in graph.values_mut() {
                edges.retain(|&t| t != victim);
            }
            victims.push(victim);
        }

        if !victims.is_empty() {
            // Wake every waiter so aborted transactions observe their state
            for queue in self.all_queues() {
                queue.cv.notify_all();
            }
        }
        victims
    }

    /// Launch the detector on a dedicated thread. It holds only a weak
    /// reference so dropping the lock manager shuts it down.
    pub fn start_cycle_detection(self: &Arc<Self>) {
        let mut slot = self.detector.lock();
        if slot.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let weak = Arc::downgrade(self);
        let interval = self.detection_interval;
        let running = Arc::clone(&self.running);
        *slot = Some(thread::spawn(move || loop {
            thread::sleep(interval);
            if !running.load(Ordering::SeqCst) {
                break;
            }
            match weak.upgrade() {
                Some(lock_manager) => {
                    lock_manager.run_detection_pass();
                }
                None => break,
            }
        }));
    }

    /// Stop the detector thread and wait for it to exit
    pub fn stop_cycle_detection(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.detector.lock().take() {
            // The detector itself may run the final drop of this manager;
            // a thread cannot join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Find a cycle by iterative DFS, trying start nodes in ascending txn
    /// id order. Returns the nodes on the cycle.
    fn find_cycle(graph: &BTreeMap<TxnId, Vec<TxnId>>) -> Option<Vec<TxnId>> {
        for &start in graph.keys() {
            let mut visited: HashSet<TxnId> = HashSet::new();
            let mut on_path: HashSet<TxnId> = HashSet::new();
            let mut path: Vec<TxnId> = Vec::new();
            // (node, index of the next edge to explore)
            let mut stack: Vec<(TxnId, usize)> = vec![(start, 0)];
            visited.insert(start);
            on_path.insert(start);
            path.push(start);

            while let Some(&(node, edge_idx)) = stack.last() {
                let neighbors = graph.get(&node).map(|v| v.as_slice()).unwrap_or(&[]);

                if edge_idx < neighbors.len() {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    let next = neighbors[edge_idx];

                    if on_path.contains(&next) {
                        let pos = path
                            .iter()
                            .position(|&t| t == next)
                            .expect("on-path node is in the path");
                        return Some(path[pos..].to_vec());
                    }
                    if visited.insert(next) {
                        on_path.insert(next);
                        path.push(next);
                        stack.push((next, 0));
                    }
                } else {
                    stack.pop();
                    let done = path.pop().expect("path mirrors the stack");
                    on_path.remove(&done);
                }
            }
        }
        None
    }

    fn all_queues(&self) -> Vec<Arc<LockRequestQueue>> {
        let mut queues: Vec<Arc<LockRequestQueue>> =
            self.table_lock_map.lock().values().cloned().collect();
        queues.extend(self.row_lock_map.lock().values().cloned());
        queues
    }
}
