use std::fmt::{Debug, Formatter};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crossbeam_channel::{Receiver, Sender};
use priority::Priority;
use crate::{Job, Spawn};

pub(crate) struct PoolInner {
    receiver: Receiver<Job>,
    ///Workers currently alive.
    workers: AtomicUsize,
    ///Workers currently parked in `recv_timeout`.
    idle: AtomicUsize,
    max_workers: usize,
    priority: Priority,
}
impl Debug for PoolInner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let workers = self.workers.load(Ordering::Relaxed);
        let idle = self.idle.load(Ordering::Relaxed);
        let priority = self.priority;
        f.write_fmt(format_args!("<PoolInner{{workers: {workers}, idle: {idle}, priority: {priority:?}, ..}}"))
    }
}

/**
A lazily-launched set of worker threads for blocking jobs.

No threads exist until the first job arrives.  A job is handed to an idle worker if there is one, otherwise a new
worker is launched, up to the pool's limit.  Workers that sit idle for [Priority::idle_timeout] shut down.

Pools are cheap to clone; clones share workers.  Hand a pool (usually behind an `Arc<dyn Spawn>`) to every component
that should share it, rather than creating one per component.
*/
#[derive(Debug,Clone)]
pub struct Pool {
    sender: Sender<Job>,
    inner: Arc<PoolInner>,
}

///Jobs block, so the default limit doesn't follow the CPU count: a worker stuck on one job must not starve the rest.
const DEFAULT_MAX_WORKERS: usize = 64;

impl Pool {
    ///Creates a pool allowing a generous number of workers.
    pub fn new(priority: Priority) -> Self {
        Self::with_max_workers(priority, DEFAULT_MAX_WORKERS)
    }
    ///Creates a pool with at most `max_workers` threads.  A limit of 0 is treated as 1.
    pub fn with_max_workers(priority: Priority, max_workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Pool {
            sender,
            inner: Arc::new(PoolInner {
                receiver,
                workers: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                max_workers: max_workers.max(1),
                priority,
            }),
        }
    }
    pub fn priority(&self) -> Priority {
        self.inner.priority
    }
    ///Number of live worker threads.
    pub fn workers(&self) -> usize {
        self.inner.workers.load(Ordering::SeqCst)
    }
}

impl PoolInner {
    ///Claims a worker slot if one is free.
    fn claim(&self) -> bool {
        self.workers.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |workers| {
            if workers < self.max_workers { Some(workers + 1) } else { None }
        }).is_ok()
    }

    ///Launches a worker if more jobs are queued than there are idle workers to take them.
    fn launch_if_needed(self: &Arc<Self>) {
        if self.idle.load(Ordering::SeqCst) >= self.receiver.len() {
            return;
        }
        if !self.claim() {
            //every worker is busy; one of them will pick the job up
            return;
        }
        let move_inner = self.clone();
        let launched = std::thread::Builder::new()
            .name(self.priority.thread_name().to_owned())
            .spawn(move || worker_fn(move_inner));
        if launched.is_err() {
            self.workers.fetch_sub(1, Ordering::SeqCst);
            //can't get a thread; don't strand the job
            if let Ok(job) = self.receiver.try_recv() {
                run_job(job);
            }
        }
    }
}

impl Spawn for Pool {
    fn spawn(&self, job: Job) {
        //our receiver lives as long as self, so the channel can't be disconnected
        if let Err(returned) = self.sender.send(job) {
            run_job(returned.into_inner());
            return;
        }
        self.inner.launch_if_needed();
    }
}

fn run_job(job: Job) {
    //a panicking job drops its mailbox, which the waiting future observes as Canceled
    let _ = std::panic::catch_unwind(AssertUnwindSafe(job));
}

fn worker_fn(pool_inner: Arc<PoolInner>) {
    let timeout = pool_inner.priority.idle_timeout();
    loop {
        pool_inner.idle.fetch_add(1, Ordering::SeqCst);
        let received = pool_inner.receiver.recv_timeout(timeout);
        pool_inner.idle.fetch_sub(1, Ordering::SeqCst);
        match received {
            Ok(job) => {
                //this worker is about to block; make sure whatever queued behind the job has a taker
                pool_inner.launch_if_needed();
                run_job(job)
            }
            Err(_) => {
                pool_inner.workers.fetch_sub(1, Ordering::SeqCst);
                //a job may have been queued after we timed out but before we stopped counting as idle
                if pool_inner.receiver.is_empty() || !pool_inner.claim() {
                    break;
                }
            }
        }
    }
}
