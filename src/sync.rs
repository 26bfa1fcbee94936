/*! Driving reactive streams from blocking code.

[block] busy-polls a future on the calling thread.  It suits callers that sit on a thread which may block anyway,
such as a pool worker or a benchmark loop.  [block_io] does the same for segio operations and folds the timeout
into [crate::Error].
*/
use std::future::Future;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use crate::fake_waker::FakeWaker;

#[derive(Debug,thiserror::Error)]
pub enum TimeoutError {
    #[error("segio::sync::block timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<TimeoutError> for crate::Error {
    fn from(e: TimeoutError) -> Self {
        crate::Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, e))
    }
}

///Polls `future` until it completes or `timeout` elapses.
///
/// Two futures blocking on each other from different threads can deadlock here.  Compare
/// [crate::test::test_await], which panics instead of returning an error.
pub fn block<F: Future>(timeout: Duration, future: F) -> Result<F::Output,TimeoutError> {
    let waker = FakeWaker::new_waker();
    let mut context = Context::from_waker(&waker);
    let started = Instant::now();
    let mut pinned = Box::pin(future);
    loop {
        if let Poll::Ready(output) = pinned.as_mut().poll(&mut context) {
            return Ok(output)
        }
        if started.elapsed() >= timeout {
            return Err(TimeoutError::TimedOut(timeout))
        }
        std::thread::yield_now();
    }
}

///[block] for a segio operation.  A timeout becomes an [crate::Error::Io] of kind `TimedOut`.
pub fn block_io<F, O>(timeout: Duration, future: F) -> crate::Result<O> where F: Future<Output=crate::Result<O>> {
    block(timeout, future)?
}

#[cfg(test)] mod tests {
    use std::pin::Pin;
    use super::*;

    struct Never;
    impl Future for Never {
        type Output = crate::Result<()>;
        fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            Poll::Pending
        }
    }

    #[test] fn ready_future() {
        assert_eq!(block(Duration::from_secs(1), async { 7 }).unwrap(), 7);
    }

    #[test] fn pending_future_times_out() {
        let result = block(Duration::from_millis(50), Never);
        assert!(matches!(result, Err(TimeoutError::TimedOut(_))));
    }

    #[test] fn timeout_is_an_io_error() {
        match block_io(Duration::from_millis(50), Never) {
            Err(crate::Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::TimedOut),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature="reactive")]
    #[test] fn drives_a_reactive_read() {
        use crate::memory::Memory;
        use crate::reactive::{AsyncIo, Inline};
        let mut leaf = Inline(Memory::from_slice(b"block"));
        let mut buf = [0u8; 5];
        block_io(Duration::from_secs(1), leaf.read_fully(&mut buf)).unwrap();
        assert_eq!(&buf, b"block");
    }
}
