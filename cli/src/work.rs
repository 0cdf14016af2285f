//! The work item the CLI schedules: echoes its own key back as the result.
//! Real hosts supply their own [`taskgraph_core::dag::TaskItem`]; this one
//! exists so `taskgraph run`/`taskgraph demo` have something to invoke.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use taskgraph_core::dag::{InvocationContext, TaskItem};
use taskgraph_core::Result;

pub struct EchoItem {
    key: String,
}

impl EchoItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl TaskItem<String> for EchoItem {
    async fn invoke_async(&self, _context: Arc<InvocationContext>) -> BoxStream<'static, Result<String>> {
        let key = self.key.clone();
        Box::pin(futures::stream::once(async move { Ok(key) }))
    }

    fn result(&self) -> Option<String> {
        Some(self.key.clone())
    }
}
