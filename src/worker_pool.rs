//! Optional bounded priority worker pool: opportunistic background
//! operations — cache trims, batched registry writes — that don't belong on
//! the supervisor thread's tick budget. Tasks are `(priority, work)`; lower
//! priority number runs first. Never used for anything the orchestrator
//! needs a result from on this tick; fire-and-forget only.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};

type Work = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    priority: u8,
    seq: u64,
    work: Work,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Task {}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert priority so the lowest number
        // sorts highest, and break ties in FIFO order (older seq first).
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Task>>,
    not_empty: Condvar,
    shutdown: Mutex<bool>,
    next_seq: Mutex<u64>,
}

/// A small fixed-size pool of worker threads draining a shared bounded
/// priority queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            not_empty: Condvar::new(),
            shutdown: Mutex::new(false),
            next_seq: Mutex::new(0),
        });

        let workers = (0..worker_count.max(1))
            .map(|index| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("worker-pool-{index}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker-pool thread")
            })
            .collect();

        WorkerPool { shared, workers }
    }

    /// Enqueues `work` at `priority` (lower runs first). Never blocks.
    pub fn submit(&self, priority: u8, work: impl FnOnce() + Send + 'static) {
        let seq = {
            let mut next = self.shared.next_seq.lock().unwrap_or_else(|p| p.into_inner());
            let seq = *next;
            *next += 1;
            seq
        };
        let mut queue = self.shared.queue.lock().unwrap_or_else(|p| p.into_inner());
        queue.push(Task { priority, seq, work: Box::new(work) });
        self.shared.not_empty.notify_one();
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Signals every worker to drain the queue and exit, then joins them.
    pub fn shutdown(mut self) {
        *self.shared.shutdown.lock().unwrap_or_else(|p| p.into_inner()) = true;
        self.shared.not_empty.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap_or_else(|p| p.into_inner());
            loop {
                if let Some(task) = queue.pop() {
                    break Some(task);
                }
                if *shared.shutdown.lock().unwrap_or_else(|p| p.into_inner()) {
                    break None;
                }
                queue = shared
                    .not_empty
                    .wait_timeout(queue, std::time::Duration::from_millis(200))
                    .unwrap_or_else(|p| p.into_inner())
                    .0;
            }
        };

        match task {
            Some(task) => (task.work)(),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn lower_priority_number_runs_first() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = mpsc::channel();

        // Keep the single worker busy while the three ordered tasks queue up
        // behind it, so their drain order reflects heap order, not arrival
        // order to an idle worker.
        pool.submit(0, || std::thread::sleep(std::time::Duration::from_millis(100)));
        std::thread::sleep(std::time::Duration::from_millis(10));

        pool.submit(5, {
            let tx = tx.clone();
            move || tx.send("low").unwrap()
        });
        pool.submit(1, {
            let tx = tx.clone();
            move || tx.send("high").unwrap()
        });
        pool.submit(3, move || tx.send("mid").unwrap());

        let received: Vec<_> = (0..3).map(|_| rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap()).collect();
        assert_eq!(received, vec!["high", "mid", "low"]);
        pool.shutdown();
    }

    #[test]
    fn submit_does_not_block_the_caller() {
        let pool = WorkerPool::new(2);
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(0, move || tx.send(i).unwrap());
        }
        let mut seen: Vec<i32> = Vec::new();
        for _ in 0..10 {
            seen.push(rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap());
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        pool.shutdown();
    }

    #[test]
    fn pending_reflects_queued_but_undrained_tasks() {
        let pool = WorkerPool::new(1);
        pool.submit(0, || std::thread::sleep(std::time::Duration::from_millis(200)));
        pool.submit(0, || {});
        pool.submit(0, || {});
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(pool.pending() >= 1);
        pool.shutdown();
    }
}
