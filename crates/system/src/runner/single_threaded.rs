//! Cooperative, single-threaded scheduling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::error;

use crate::error::SystemError;
use crate::roles::{Following, Promptable};
use crate::system::System;

#[derive(Debug, Default)]
struct PromptQueue {
    pending: VecDeque<String>,
    is_prompting: bool,
}

/// The shared state leaders prompt into.
struct Inner {
    system: System,
    queue: Mutex<PromptQueue>,
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, PromptQueue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Promptable for Inner {
    fn receive_prompt(&self, leader_name: &str) {
        {
            let mut queue = self.lock_queue();
            if !queue.pending.iter().any(|name| name == leader_name) {
                queue.pending.push_back(leader_name.to_string());
            }
            if queue.is_prompting {
                // A drain loop further down the stack will pick this up.
                return;
            }
            queue.is_prompting = true;
        }

        loop {
            let next = {
                let mut queue = self.lock_queue();
                match queue.pending.pop_front() {
                    Some(name) => name,
                    None => {
                        queue.is_prompting = false;
                        break;
                    }
                }
            };
            for follower_name in self.system.leads(&next) {
                let Some(follower) = self
                    .system
                    .node(follower_name)
                    .and_then(|node| node.as_processor())
                else {
                    continue;
                };
                if let Err(e) = follower.pull_and_process(&next) {
                    error!(
                        leader = %next,
                        follower = follower_name,
                        error = %e,
                        "processing failed"
                    );
                }
            }
        }
    }
}

/// Runs a whole system on the calling thread.
///
/// The runner is the promptable handed to every leader. Prompts enqueue the
/// leader's name (deduplicated); a re-entrancy guard ensures a single drain
/// loop processes the queue in FIFO order, so prompts raised while a
/// follower is processing are appended rather than nested. Event delivery is
/// synchronous: by the time `save` returns, downstream followers have run.
pub struct SingleThreadedRunner {
    inner: Arc<Inner>,
    started: AtomicBool,
}

impl SingleThreadedRunner {
    pub fn new(system: System) -> Self {
        Self {
            inner: Arc::new(Inner {
                system,
                queue: Mutex::new(PromptQueue::default()),
            }),
            started: AtomicBool::new(false),
        }
    }

    pub fn system(&self) -> &System {
        &self.inner.system
    }

    /// Wire followers to leaders and leaders to this runner.
    pub fn start(&self) -> Result<(), SystemError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SystemError::AlreadyStarted);
        }

        let system = &self.inner.system;
        for (leader_name, follower_name) in system.edges() {
            let leader = system
                .node(leader_name)
                .ok_or_else(|| SystemError::UnknownNode(leader_name.clone()))?;
            let follower = system
                .node(follower_name)
                .and_then(|node| node.as_processor())
                .ok_or_else(|| SystemError::NotAFollower(follower_name.clone()))?;
            follower.follow(leader_name, leader.log());
        }
        for leader_name in system.leaders() {
            if let Some(leader) = system.node(leader_name) {
                leader.lead(Arc::clone(&self.inner) as Arc<dyn Promptable>);
            }
        }
        Ok(())
    }

    /// Drop any prompts that have not been processed yet.
    pub fn stop(&self) {
        self.inner.lock_queue().pending.clear();
    }
}

impl core::fmt::Debug for SingleThreadedRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SingleThreadedRunner")
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
