/*!
A microthreadpool for blocking IO.

block_party solves a common problem in async Rust, which is:
1.  You have to call a blocking function (a file read, a slow producer, a lock held by someone else)
2.  You can't block; you need to suspend/await instead.
3.  So you need to move the call onto some other thread and get woken when it's done.  But maybe not 50 threads if you do this 50 times back to back?  That seems bad?

This is where block_party comes in.  Rather than picking a global executor, components that need to offload
blocking work accept a [Spawn] strategy from their caller.  block_party provides two:

1.  [Pool], a lazily-launched set of worker threads scoped to a [Priority].  Workers shut down after they have
    been idle for a while, and are relaunched on demand.
2.  [Inline], which runs the job right away on the calling thread.  This is useful for tests and for sources that
    are known to be fast.

To get a value back out, call [run], which wraps your closure into a job and returns a [Future] for its output.
*/
mod pool;
mod future;

use std::sync::Arc;

pub use future::Future;
pub use pool::Pool;
pub use priority::Priority;

///A unit of blocking work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/**
An execution strategy for blocking work.

Implementations must eventually run every job they accept, exactly once.  Jobs may run on any thread, in any order
relative to jobs submitted from other threads.
*/
pub trait Spawn: Send + Sync {
    fn spawn(&self, job: Job);
}

impl<S: Spawn + ?Sized> Spawn for Arc<S> {
    fn spawn(&self, job: Job) {
        (**self).spawn(job)
    }
}
impl<S: Spawn + ?Sized> Spawn for &S {
    fn spawn(&self, job: Job) {
        (**self).spawn(job)
    }
}

///Runs every job immediately on the calling thread.
#[derive(Debug,Clone,Copy,Default)]
pub struct Inline;
impl Spawn for Inline {
    fn spawn(&self, job: Job) {
        job()
    }
}

///The job was dropped before it produced a value, usually because it panicked.
#[derive(Debug,Clone,Copy,PartialEq,Eq,thiserror::Error)]
#[error("block_party job was dropped before completing")]
pub struct Canceled;

/**
Runs `operation` on `spawn` and returns a future for its output.

The operation is submitted immediately, not on first poll.
*/
pub fn run<S, F, O>(spawn: &S, operation: F) -> Future<O> where S: Spawn + ?Sized, F: FnOnce() -> O + Send + 'static, O: Send + 'static {
    let (future, sender) = future::channel();
    spawn.spawn(Box::new(move || {
        let output = operation();
        sender.send_mail(output);
    }));
    future
}

#[cfg(test)] mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Poll;
    use std::time::Duration;
    use crossbeam_channel::{Receiver, Sender};
    use once_cell::sync::Lazy;
    use crate::{Canceled, Inline, Pool, Priority};

    /* Test equipment */
    static TEST_POOL: Lazy<Pool> = Lazy::new(|| Pool::new(Priority::Testing));

    fn gate() -> (Sender<u8>, Receiver<u8>) {
        crossbeam_channel::bounded(10)
    }

    #[test] fn test_future() {
        let (sender, receiver) = gate();
        let future = crate::run(&*TEST_POOL, move || receiver.recv().unwrap() + 20);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            sender.send(3).unwrap();
        });
        let r = segio::test::test_await(future, Duration::from_secs(1));
        assert_eq!(r, Ok(23));
    }

    #[test] fn test_two_futures() {
        let pool = Pool::with_max_workers(Priority::Testing, 2);
        let (sender_1, receiver_1) = gate();
        let (sender_2, receiver_2) = gate();
        let mut future = crate::run(&pool, move || receiver_1.recv().unwrap());
        let mut future = Pin::new(&mut future);
        let mut future2 = crate::run(&pool, move || receiver_2.recv().unwrap());
        let mut future2 = Pin::new(&mut future2);

        let r = segio::test::test_poll_pin(&mut future);
        assert_eq!(r, Poll::Pending);
        let r2 = segio::test::test_poll_pin(&mut future2);
        assert_eq!(r2, Poll::Pending);

        sender_2.send(2).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let r = segio::test::test_poll_pin(&mut future);
        assert_eq!(r, Poll::Pending);

        let r2 = segio::test::test_poll_pin(&mut future2);
        assert_eq!(r2, Poll::Ready(Ok(2)));

        sender_1.send(1).unwrap();
        let r = segio::test::test_await(future, Duration::from_secs(1));
        assert_eq!(r, Ok(1));
    }

    #[test] fn blocked_job_does_not_starve_the_queue() {
        let pool = Pool::new(Priority::Testing);
        let (sender, receiver) = gate();
        let blocked = crate::run(&pool, move || receiver.recv().unwrap());
        let quick = crate::run(&pool, || 2);
        assert_eq!(segio::test::test_await(quick, Duration::from_secs(1)), Ok(2));
        sender.send(1).unwrap();
        assert_eq!(segio::test::test_await(blocked, Duration::from_secs(1)), Ok(1));
    }

    #[test] fn inline_runs_before_returning() {
        let future = crate::run(&Inline, || 5);
        assert_eq!(segio::test::test_poll(future), Poll::Ready(Ok(5)));
    }

    #[test] fn panicking_job_cancels() {
        let future = crate::run(&*TEST_POOL, || -> u8 { panic!("job failed") });
        let r = segio::test::test_await(future, Duration::from_secs(1));
        assert_eq!(r, Err(Canceled));
        //the pool survives a panicking job
        let again = crate::run(&*TEST_POOL, || 7);
        assert_eq!(segio::test::test_await(again, Duration::from_secs(1)), Ok(7));
    }

    #[test] fn many_jobs_bounded_workers() {
        let pool = Pool::with_max_workers(Priority::Testing, 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let futures: Vec<_> = (0..50).map(|_| {
            let counter = counter.clone();
            crate::run(&pool, move || {
                std::thread::sleep(Duration::from_millis(rand::random::<u64>() % 3));
                counter.fetch_add(1, Ordering::SeqCst)
            })
        }).collect();
        for future in futures {
            segio::test::test_await(future, Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert!(pool.workers() <= 2);
    }

    #[test] fn relaunch_after_idle() {
        let pool = Pool::new(Priority::Testing);
        let first = crate::run(&pool, || 1);
        assert_eq!(segio::test::test_await(first, Duration::from_secs(1)), Ok(1));
        //long enough for the worker to shut down
        std::thread::sleep(Priority::Testing.idle_timeout() * 3);
        assert_eq!(pool.workers(), 0);
        let second = crate::run(&pool, || 2);
        assert_eq!(segio::test::test_await(second, Duration::from_secs(1)), Ok(2));
    }
}
