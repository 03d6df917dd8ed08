use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::polling::api::{FetchError, RawResponse, SnapshotSource};

/// One scripted answer.
#[derive(Debug)]
pub enum MockReply {
    Body(RawResponse),
    Fail(FetchError),
    /// Never answers; only a timeout gets the caller out.
    Hang,
}

/// In-memory snapshot source replaying a script, for tests.
#[derive(Debug, Default)]
pub struct MockSource {
    replies: Mutex<VecDeque<MockReply>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Queues an uncompressed JSON snapshot.
    pub fn push_json(&self, snapshot: &Value) {
        self.push(MockReply::Body(RawResponse::plain(snapshot.to_string())));
    }

    pub fn with(self, reply: MockReply) -> Self {
        self.push(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn fetch(&self) -> Result<RawResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());

        match next {
            Some(MockReply::Body(response)) => Ok(response),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(FetchError::Network("mock script exhausted".into())),
        }
    }
}
