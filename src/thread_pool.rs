use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread::{Builder, JoinHandle},
};

use crate::error::Result;

pub const DEFAULT_POOL_CAPACITY: usize = 4;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Task),
    Shutdown,
}

/// Fixed-size worker pool that the reactor dispatches handler calls onto.
///
/// Each worker owns its own channel; tasks are distributed round-robin so a
/// slow handler only backs up one worker's queue.
pub struct ThreadPool {
    workers: Vec<Worker>,
    senders: Vec<mpsc::Sender<Command>>,
    next_worker: AtomicUsize,
}

impl Default for ThreadPool {
    fn default() -> Self {
        let default_capacity = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(DEFAULT_POOL_CAPACITY);
        Self::new(default_capacity)
    }
}

impl ThreadPool {
    pub fn new(capacity: usize) -> Self {
        let mut workers = Vec::with_capacity(capacity);
        let mut senders = Vec::with_capacity(capacity);

        for id in 0..capacity {
            let (sender, receiver) = mpsc::channel::<Command>();
            workers.push(Worker::new(id, receiver));
            senders.push(sender);
        }

        Self {
            workers,
            senders,
            next_worker: AtomicUsize::new(0),
        }
    }

    /// Queues `task` on the next worker in round-robin order.
    pub fn exec<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        Ok(self.senders[index].send(Command::Run(Box::new(task)))?)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for sender in &self.senders {
            let _ = sender.send(Command::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(t) = worker.take_thread() {
                let _ = t.join();
            }
        }
    }
}

struct Worker {
    #[allow(dead_code)]
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(id: usize, receiver: mpsc::Receiver<Command>) -> Self {
        let thread = Builder::new()
            .name(format!("weir-io-worker-{id}"))
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        Command::Run(task) => task(),
                        Command::Shutdown => break,
                    }
                }
            })
            .unwrap_or_else(|e| panic!("couldn't spawn worker thread {id}: {e}"));

        Self {
            id,
            thread: Some(thread),
        }
    }

    pub fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc, Mutex,
        },
        time::Duration,
    };

    use super::*;

    #[test]
    fn every_submitted_task_runs() {
        let pool = ThreadPool::new(3);
        let (tx, rx) = mpsc::channel();

        for i in 0..12 {
            let tx = tx.clone();
            pool.exec(move || tx.send(i).unwrap()).unwrap();
        }

        let mut seen: Vec<i32> = (0..12)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn round_robin_uses_every_worker() {
        let pool = ThreadPool::new(2);
        let names = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();

        for _ in 0..4 {
            let names = Arc::clone(&names);
            let tx = tx.clone();
            pool.exec(move || {
                let name = std::thread::current().name().map(str::to_owned);
                names.lock().unwrap().push(name);
                tx.send(()).unwrap();
            })
            .unwrap();
        }
        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        let names = names.lock().unwrap();
        assert!(names
            .iter()
            .all(|n| n.as_deref().is_some_and(|n| n.starts_with("weir-io-worker-"))));
        let distinct: HashSet<_> = names.iter().cloned().collect();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn a_slow_handler_only_blocks_its_own_worker() {
        let pool = ThreadPool::new(2);
        let (slow_tx, slow_rx) = mpsc::channel();
        let (fast_tx, fast_rx) = mpsc::channel();

        // Lands on worker 0 and parks it.
        pool.exec(move || {
            std::thread::sleep(Duration::from_millis(300));
            slow_tx.send(()).unwrap();
        })
        .unwrap();
        // Lands on worker 1 and must not wait behind the sleeper.
        pool.exec(move || fast_tx.send(()).unwrap()).unwrap();

        fast_rx.recv_timeout(Duration::from_millis(250)).unwrap();
        slow_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn drop_joins_workers_after_pending_tasks_finish() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(1);
            for _ in 0..3 {
                let counter = Arc::clone(&counter);
                pool.exec(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
