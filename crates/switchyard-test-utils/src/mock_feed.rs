use std::collections::VecDeque;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use switchyard_core::error::Result;
use switchyard_core::traits::FeedSource;
use switchyard_core::types::{FeedItem, FeedPoll};

/// Feed that plays back a fixed sequence of polls, then reports exhaustion.
pub struct ScriptedFeed {
    polls: Mutex<VecDeque<FeedPoll>>,
}

impl ScriptedFeed {
    pub fn new(polls: impl IntoIterator<Item = FeedPoll>) -> Self {
        Self {
            polls: Mutex::new(polls.into_iter().collect()),
        }
    }

    /// One item per poll with the given contents, ids counting from 1.
    pub fn items(contents: &[&str]) -> Self {
        Self::new(contents.iter().enumerate().map(|(i, content)| {
            FeedPoll::Item(FeedItem {
                id: i as u64 + 1,
                content: content.to_string(),
                urgent: false,
            })
        }))
    }

    pub async fn remaining(&self) -> usize {
        self.polls.lock().await.len()
    }
}

impl FeedSource for ScriptedFeed {
    fn poll(&self) -> BoxFuture<'_, Result<FeedPoll>> {
        Box::pin(async move {
            let next = self.polls.lock().await.pop_front();
            Ok(next.unwrap_or(FeedPoll::Exhausted))
        })
    }
}
