// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Owner context for bus registrations.
//!
//! Listener registration has thread affinity: a listener must be removed on
//! the same context that added it. The owner context is a dedicated thread
//! draining a job queue. Work submitted from any other thread is posted to
//! the queue; work submitted from the owner thread runs inline.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the thread that owns bus registrations.
#[derive(Clone)]
pub struct OwnerContext {
    jobs: async_channel::Sender<Job>,
    thread: ThreadId,
}

impl OwnerContext {
    /// Spawn a named owner thread.
    ///
    /// The thread exits once every handle has been dropped.
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (jobs, queue) = async_channel::unbounded::<Job>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = queue.recv_blocking() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("Job panicked on owner thread");
                    }
                }
                debug!("Owner thread queue closed");
            })?;

        Ok(Self {
            jobs,
            thread: handle.thread().id(),
        })
    }

    /// True when called from the owner thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Queue a job behind everything already posted.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.jobs.try_send(Box::new(job)).is_err() {
            warn!("Owner thread is gone, dropping job");
        }
    }

    /// Run inline on the owner thread, otherwise post.
    pub fn run_or_post(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            job();
        } else {
            self.post(job);
        }
    }

    /// Resolve once every job posted before this call has run.
    pub async fn barrier(&self) {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}

impl std::fmt::Debug for OwnerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerContext")
            .field("thread", &self.thread)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_posted_jobs_run_on_owner_thread() {
        let owner = OwnerContext::spawn("test-owner").unwrap();
        assert!(!owner.is_current());

        let ran_on_owner = Arc::new(AtomicBool::new(false));
        let flag = ran_on_owner.clone();
        let current = owner.clone();
        owner.post(move || flag.store(current.is_current(), Ordering::SeqCst));
        owner.barrier().await;

        assert!(ran_on_owner.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_or_post_is_inline_on_owner() {
        let owner = OwnerContext::spawn("test-owner").unwrap();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let inner_owner = owner.clone();
        let log = order.clone();
        owner.post(move || {
            let nested = log.clone();
            inner_owner.run_or_post(move || nested.lock().push("inline"));
            log.lock().push("after");
        });
        owner.barrier().await;

        assert_eq!(*order.lock(), vec!["inline", "after"]);
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_thread_alive() {
        let owner = OwnerContext::spawn("test-owner").unwrap();
        owner.post(|| panic!("boom"));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        owner.post(move || flag.store(true, Ordering::SeqCst));
        owner.barrier().await;

        assert!(ran.load(Ordering::SeqCst));
    }
}
