/*!
Prefetching from a slow producer.

A [Lookahead] wraps a producer that may block (reading the next chunk off the network, decoding the next frame)
and keeps up to `depth` of its items ready ahead of the consumer.  Production runs as jobs on a caller-supplied
[Spawn] strategy, never on the consumer's thread unless the strategy says so, and never more than one at a time.

Items come out in production order through [futures::Stream] or, for threads that may block,
[Lookahead::next_blocking].  The end of the producer and its first error are both terminal and are delivered
exactly once.
*/
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use block_party::Spawn;
use crate::error::{Error, Result};

///Produces the next item, `None` at the end.
pub type Producer<T> = Box<dyn FnMut() -> Result<Option<T>> + Send>;

#[derive(Debug)]
enum End {
    Open,
    Done,
    Failed(Error),
}

struct State<T> {
    queue: VecDeque<T>,
    ///Parked here between productions, taken out while one runs.
    producer: Option<Producer<T>>,
    in_flight: bool,
    end: End,
    ///A consumer found the queue empty and is waiting.
    demand: bool,
    waker: Option<Waker>,
    ///The consumer is gone.
    abandoned: bool,
}

impl<T> State<T> {
    fn wants_more(&self, depth: usize) -> bool {
        matches!(self.end, End::Open) && !self.abandoned
            && (self.queue.len() < depth || (self.demand && self.queue.is_empty()))
    }
    ///The next thing for the consumer, if there is one.  Terminal outcomes are handed out once.
    fn take(&mut self) -> Option<Option<Result<T>>> {
        if let Some(item) = self.queue.pop_front() {
            self.demand = false;
            return Some(Some(Ok(item)));
        }
        match std::mem::replace(&mut self.end, End::Done) {
            End::Open => {
                self.end = End::Open;
                None
            }
            End::Done => Some(None),
            End::Failed(e) => Some(Some(Err(e))),
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    produced: Condvar,
    depth: usize,
    spawn: Arc<dyn Spawn>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/**
A bounded prefetch queue in front of a producer.

```
use std::sync::Arc;
use segio::lookahead::Lookahead;
let mut remaining = 3;
let lookahead = Lookahead::new(Box::new(move || {
    remaining -= 1;
    Ok(if remaining >= 0 { Some(remaining) } else { None })
}), 2, Arc::new(segio::block_party::Inline));
let items: Vec<i32> = std::iter::from_fn(|| lookahead.next_blocking()).map(|r| r.unwrap()).collect();
assert_eq!(items, vec![2, 1, 0]);
```
*/
pub struct Lookahead<T> {
    shared: Arc<Shared<T>>,
}

impl<T> std::fmt::Debug for Lookahead<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Lookahead")
            .field("depth", &self.shared.depth)
            .field("queued", &state.queue.len())
            .field("in_flight", &state.in_flight)
            .field("end", &state.end)
            .finish()
    }
}

impl<T: Send + 'static> Lookahead<T> {
    /**
    Starts prefetching `depth` items from `producer` on `spawn`.

    With a depth of 0 nothing is produced until the consumer asks.
    */
    pub fn new(producer: Producer<T>, depth: usize, spawn: Arc<dyn Spawn>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(depth),
                producer: Some(producer),
                in_flight: false,
                end: End::Open,
                demand: false,
                waker: None,
                abandoned: false,
            }),
            produced: Condvar::new(),
            depth,
            spawn,
        });
        kick(&shared);
        Lookahead { shared }
    }

    ///Items produced but not yet consumed.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn depth(&self) -> usize {
        self.shared.depth
    }

    ///Takes the next item, blocking the calling thread until one is ready.  `None` once the producer is done.
    pub fn next_blocking(&self) -> Option<Result<T>> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(next) = state.take() {
                    drop(state);
                    kick(&self.shared);
                    return next;
                }
                state.demand = true;
            }
            kick(&self.shared);
            let mut state = self.shared.lock();
            while state.queue.is_empty() && matches!(state.end, End::Open) && state.in_flight {
                state = self.shared.produced.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

///Starts a production job if one is wanted and none is running.
fn kick<T: Send + 'static>(shared: &Arc<Shared<T>>) {
    let producer = {
        let mut state = shared.lock();
        if state.in_flight || !state.wants_more(shared.depth) {
            return;
        }
        match state.producer.take() {
            Some(producer) => {
                state.in_flight = true;
                producer
            }
            None => return,
        }
    };
    let job_shared = shared.clone();
    //the lock must not be held here: an inline strategy runs the job right away
    shared.spawn.spawn(Box::new(move || produce(job_shared, producer)));
}

///Runs the producer until the queue is deep enough, the source ends, or it fails.
fn produce<T: Send + 'static>(shared: Arc<Shared<T>>, mut producer: Producer<T>) {
    loop {
        let result = std::panic::catch_unwind(AssertUnwindSafe(&mut producer)).unwrap_or_else(|_| {
            log::warn!("lookahead producer panicked");
            Err(Error::Worker)
        });
        let mut state = shared.lock();
        match result {
            Ok(Some(item)) => state.queue.push_back(item),
            Ok(None) => state.end = End::Done,
            Err(e) => {
                log::debug!("lookahead producer failed: {e}");
                state.end = End::Failed(e);
            }
        }
        let waker = state.waker.take();
        if !state.wants_more(shared.depth) {
            state.in_flight = false;
            if matches!(state.end, End::Open) {
                state.producer = Some(producer);
            }
            drop(state);
            notify(&shared, waker);
            return;
        }
        drop(state);
        notify(&shared, waker);
    }
}

fn notify<T>(shared: &Shared<T>, waker: Option<Waker>) {
    shared.produced.notify_all();
    if let Some(waker) = waker {
        waker.wake();
    }
}

impl<T: Send + 'static> futures::Stream for Lookahead<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let shared = &self.get_mut().shared;
        //a second look after kicking picks up what an inline strategy produced
        for _ in 0..2 {
            {
                let mut state = shared.lock();
                if let Some(next) = state.take() {
                    drop(state);
                    kick(shared);
                    return Poll::Ready(next);
                }
                state.demand = true;
                state.waker = Some(cx.waker().clone());
            }
            kick(shared);
        }
        Poll::Pending
    }
}

impl<T> Drop for Lookahead<T> {
    fn drop(&mut self) {
        self.shared.lock().abandoned = true;
    }
}

#[cfg(test)] mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use futures::StreamExt;
    use rand::Rng;
    use block_party::{Inline, Pool, Priority, Spawn};
    use crate::error::Error;
    use crate::test::{poll_inline, test_await};
    use super::{Lookahead, Producer};

    fn counting(n: usize) -> Producer<usize> {
        let mut next = 0;
        Box::new(move || {
            if next == n {
                return Ok(None);
            }
            next += 1;
            Ok(Some(next - 1))
        })
    }

    fn pool() -> Arc<dyn Spawn> {
        Arc::new(Pool::new(Priority::Testing))
    }

    #[test] fn delivers_in_order_at_every_depth() {
        for n in [0, 1, 2, 17] {
            for depth in [0, 1, 3, 32] {
                let lookahead = Lookahead::new(counting(n), depth, pool());
                let items: Vec<usize> = std::iter::from_fn(|| lookahead.next_blocking()).map(|r| r.unwrap()).collect();
                assert_eq!(items, (0..n).collect::<Vec<_>>(), "n={n} depth={depth}");
            }
        }
    }

    #[test] fn stream_consumer() {
        let lookahead = Lookahead::new(counting(10), 4, pool());
        let items: Vec<usize> = test_await(lookahead.map(|r| r.unwrap()).collect(), Duration::from_secs(5));
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }

    #[test] fn inline_strategy_is_immediate() {
        let mut lookahead = Lookahead::new(counting(3), 0, Arc::new(Inline));
        assert_eq!(lookahead.queued(), 0);
        assert_eq!(poll_inline(lookahead.next()).unwrap().unwrap().unwrap(), 0);
        assert_eq!(poll_inline(lookahead.next()).unwrap().unwrap().unwrap(), 1);
        assert_eq!(poll_inline(lookahead.next()).unwrap().unwrap().unwrap(), 2);
        assert!(poll_inline(lookahead.next()).unwrap().is_none());
        assert!(poll_inline(lookahead.next()).unwrap().is_none());
    }

    #[test] fn prefetches_up_to_depth() {
        let lookahead = Lookahead::new(counting(100), 5, Arc::new(Inline));
        assert_eq!(lookahead.queued(), 5);
        assert_eq!(lookahead.next_blocking().unwrap().unwrap(), 0);
        //consuming one refills the queue
        assert_eq!(lookahead.queued(), 5);
    }

    #[test] fn error_is_terminal_and_delivered_once() {
        let mut calls = 0;
        let producer: Producer<u8> = Box::new(move || {
            calls += 1;
            match calls {
                1 | 2 => Ok(Some(calls)),
                3 => Err(Error::InvalidArgument("bad chunk")),
                _ => panic!("producer called after failing"),
            }
        });
        let lookahead = Lookahead::new(producer, 8, pool());
        assert_eq!(lookahead.next_blocking().unwrap().unwrap(), 1);
        assert_eq!(lookahead.next_blocking().unwrap().unwrap(), 2);
        assert!(matches!(lookahead.next_blocking(), Some(Err(Error::InvalidArgument("bad chunk")))));
        assert!(lookahead.next_blocking().is_none());
    }

    #[test] fn panicking_producer_fails_the_stream() {
        let producer: Producer<u8> = Box::new(|| panic!("producer exploded"));
        let lookahead = Lookahead::new(producer, 1, Arc::new(Inline));
        assert!(matches!(lookahead.next_blocking(), Some(Err(Error::Worker))));
        assert!(lookahead.next_blocking().is_none());
    }

    #[test] fn one_production_at_a_time() {
        crate::test::init_logging();
        let running = Arc::new(AtomicUsize::new(0));
        let worst = Arc::new(AtomicUsize::new(0));
        let (r, w) = (running.clone(), worst.clone());
        let mut left = 200;
        let producer: Producer<u32> = Box::new(move || {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            w.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_micros(rand::thread_rng().gen_range(0..200)));
            r.fetch_sub(1, Ordering::SeqCst);
            if left == 0 {
                return Ok(None);
            }
            left -= 1;
            Ok(Some(left))
        });
        let spawn: Arc<dyn Spawn> = Arc::new(Pool::with_max_workers(Priority::Testing, 8));
        let lookahead = Lookahead::new(producer, 3, spawn);
        let mut rng = rand::thread_rng();
        let mut expected = 200;
        while let Some(item) = lookahead.next_blocking() {
            expected -= 1;
            assert_eq!(item.unwrap(), expected);
            if rng.gen_bool(0.1) {
                std::thread::sleep(Duration::from_micros(rng.gen_range(0..300)));
            }
        }
        assert_eq!(expected, 0);
        assert_eq!(worst.load(Ordering::SeqCst), 1);
    }
}
