use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use atomic_waker::AtomicWaker;
use crate::Canceled;

pub(crate) struct Mailbox<Output> {
    output: Mutex<Option<Result<Output, Canceled>>>,
    waker: AtomicWaker,
}
impl<Output> Mailbox<Output> {
    fn deliver(&self, output: Result<Output, Canceled>) {
        *self.output.lock().unwrap_or_else(PoisonError::into_inner) = Some(output);
        self.waker.wake();
    }
    fn take(&self) -> Option<Result<Output, Canceled>> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

///Write side of a [Mailbox].  Dropping it without sending delivers [Canceled].
pub(crate) struct MailboxSender<Output> {
    mailbox: Arc<Mailbox<Output>>,
    sent: bool,
}
impl<Output> MailboxSender<Output> {
    pub(crate) fn send_mail(mut self, output: Output) {
        self.sent = true;
        self.mailbox.deliver(Ok(output));
    }
}
impl<Output> Drop for MailboxSender<Output> {
    fn drop(&mut self) {
        if !self.sent {
            self.mailbox.deliver(Err(Canceled));
        }
    }
}

pub(crate) fn channel<Output>() -> (Future<Output>, MailboxSender<Output>) {
    let mailbox = Arc::new(Mailbox { output: Mutex::new(None), waker: AtomicWaker::new() });
    (Future { mailbox: mailbox.clone(), gone: false }, MailboxSender { mailbox, sent: false })
}

/**
The output of a job submitted with [crate::run].

Resolves to [Canceled] if the job was dropped without running to completion.  Dropping this future does not cancel
the job; it runs anyway and its output is discarded.
*/
pub struct Future<Output> {
    mailbox: Arc<Mailbox<Output>>,
    gone: bool,
}

impl<Output> std::future::Future for Future<Output> {
    type Output = Result<Output, Canceled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let unpin = self.get_mut();
        if unpin.gone {
            panic!("block_party::Future polled after completion")
        }
        let output = match unpin.mailbox.take() {
            Some(output) => Some(output),
            None => {
                unpin.mailbox.waker.register(cx.waker());
                unpin.mailbox.take() //try one more time
            }
        };
        match output {
            Some(output) => {
                unpin.gone = true; //never allow us to do this again
                Poll::Ready(output)
            }
            None => Poll::Pending
        }
    }
}
