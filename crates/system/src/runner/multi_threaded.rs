//! Thread-per-follower scheduling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::error::SystemError;
use crate::roles::{Following, Leading, Promptable};
use crate::system::System;

/// One follower's mailbox: pending leader names plus a wake-up signal.
#[derive(Debug, Default)]
struct PromptQueue {
    pending: Mutex<Vec<String>>,
    prompted: Condvar,
}

impl PromptQueue {
    fn lock_pending(&self) -> MutexGuard<'_, Vec<String>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The promptable handed to leaders: appends (deduplicated) and signals.
struct WorkerPrompt {
    queue: Arc<PromptQueue>,
}

impl Promptable for WorkerPrompt {
    fn receive_prompt(&self, leader_name: &str) {
        let mut pending = self.queue.lock_pending();
        if !pending.iter().any(|name| name == leader_name) {
            pending.push(leader_name.to_string());
        }
        self.queue.prompted.notify_one();
    }
}

struct WorkerHandle {
    name: String,
    join: Option<JoinHandle<()>>,
}

/// Runs each follower on its own worker thread.
///
/// Leaders run inline on whatever thread saves through them; their prompts
/// land in the follower's mailbox and wake its worker. Prompts arriving
/// while a follower is busy coalesce into the same pending set, so none are
/// lost. `stop` flips a shared flag, wakes every worker and joins them.
pub struct MultiThreadedRunner {
    system: System,
    queues: HashMap<String, Arc<PromptQueue>>,
    workers: Mutex<Vec<WorkerHandle>>,
    is_stopping: Arc<AtomicBool>,
    started: AtomicBool,
}

impl MultiThreadedRunner {
    pub fn new(system: System) -> Self {
        let queues = system
            .followers()
            .into_iter()
            .map(|name| (name.to_string(), Arc::new(PromptQueue::default())))
            .collect();
        Self {
            system,
            queues,
            workers: Mutex::new(Vec::new()),
            is_stopping: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        }
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Wire the graph and spawn one worker thread per follower.
    pub fn start(&self) -> Result<(), SystemError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SystemError::AlreadyStarted);
        }

        for (leader_name, follower_name) in self.system.edges() {
            let leader = self
                .system
                .node(leader_name)
                .ok_or_else(|| SystemError::UnknownNode(leader_name.clone()))?;
            let follower = self
                .system
                .node(follower_name)
                .and_then(|node| node.as_processor())
                .ok_or_else(|| SystemError::NotAFollower(follower_name.clone()))?;

            follower.follow(leader_name, leader.log());
            let queue = Arc::clone(&self.queues[follower_name.as_str()]);
            leader.lead(Arc::new(WorkerPrompt { queue }));
        }

        let mut workers = self.lock_workers();
        for follower_name in self.system.followers() {
            let processor = self
                .system
                .node(follower_name)
                .and_then(|node| node.as_processor())
                .cloned()
                .ok_or_else(|| SystemError::NotAFollower(follower_name.to_string()))?;
            let queue = Arc::clone(&self.queues[follower_name]);
            let is_stopping = Arc::clone(&self.is_stopping);

            let join = thread::Builder::new()
                .name(format!("chronicle-{follower_name}"))
                .spawn(move || worker_loop(processor, queue, is_stopping))
                .map_err(|e| SystemError::Worker(e.to_string()))?;
            workers.push(WorkerHandle {
                name: follower_name.to_string(),
                join: Some(join),
            });
        }
        Ok(())
    }

    /// Request shutdown, wake all workers and wait for them to finish their
    /// current drain.
    pub fn stop(&self) {
        self.is_stopping.store(true, Ordering::SeqCst);
        for queue in self.queues.values() {
            queue.prompted.notify_all();
        }
        let mut workers = self.lock_workers();
        for worker in workers.iter_mut() {
            if let Some(join) = worker.join.take() {
                if join.join().is_err() {
                    error!(worker = %worker.name, "worker thread panicked");
                }
            }
        }
        workers.clear();
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<WorkerHandle>> {
        match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for MultiThreadedRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl core::fmt::Debug for MultiThreadedRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MultiThreadedRunner")
            .field("followers", &self.queues.keys().collect::<Vec<_>>())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn worker_loop(
    processor: Arc<dyn Following>,
    queue: Arc<PromptQueue>,
    is_stopping: Arc<AtomicBool>,
) {
    loop {
        let names: Vec<String> = {
            let mut pending = queue.lock_pending();
            while pending.is_empty() && !is_stopping.load(Ordering::SeqCst) {
                pending = match queue.prompted.wait(pending) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            if pending.is_empty() {
                // Only reachable when stopping.
                return;
            }
            pending.drain(..).collect()
        };

        for name in names {
            if let Err(e) = processor.pull_and_process(&name) {
                error!(
                    follower = processor.name(),
                    leader = %name,
                    error = %e,
                    "processing failed"
                );
            }
        }
    }
}
