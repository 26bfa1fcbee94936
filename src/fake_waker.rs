use std::task::{Wake, Waker};
use std::sync::Arc;

//fake waker for busy-polling drivers; wakeups are ignored because the driver polls again anyway
pub(crate) struct FakeWaker;
impl Wake for FakeWaker {
    fn wake(self: Arc<Self>) {
        //nothing
    }
}
impl FakeWaker {
    pub fn new_waker() -> Waker {
        Arc::new(FakeWaker).into()
    }
}
