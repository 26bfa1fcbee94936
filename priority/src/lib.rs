use std::time::Duration;

///Models the priority of blocking work handed to a worker pool.
///
/// This normally ought to be chosen by the top level application,
/// as e.g. prefetching the next chunk of a log is a lot different than reading a document the user
/// just opened, and this is normally not possible to distinguish in a library.  Therefore,
/// libraries ought to accept a priority (or a pool built with one) from their callers
/// rather than picking one themselves.
#[non_exhaustive]
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
pub enum Priority {
    ///The user is actively blocked waiting for the result.  This is a high-priority task, but not realtime.
    UserWaiting,
    ///Work ahead of demand, such as lookahead prefetching.  Nobody is waiting on it yet.
    Background,
    ///This priority is used for most unit tests that don't especially care what priority they use.
    Testing
}

impl Priority {
    ///Name given to worker threads running at this priority.
    pub fn thread_name(self) -> &'static str {
        match self {
            Priority::UserWaiting => "segio block_party user_waiting",
            Priority::Background => "segio block_party background",
            Priority::Testing => "segio block_party testing",
        }
    }
    ///How long an idle worker lingers before shutting down.
    ///
    /// In some workloads a new job arrives right after the queue drains, so latency-sensitive
    /// workers stay around a bit longer.
    pub fn idle_timeout(self) -> Duration {
        match self {
            Priority::UserWaiting => Duration::from_secs(1),
            Priority::Background => Duration::from_millis(250),
            Priority::Testing => Duration::from_millis(100),
        }
    }
}

#[test] fn idle_timeouts_ordered() {
    assert!(Priority::UserWaiting.idle_timeout() > Priority::Background.idle_timeout());
    assert_ne!(Priority::Background.thread_name(), Priority::UserWaiting.thread_name());
}
