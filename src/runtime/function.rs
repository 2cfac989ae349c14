//! Invokes a registered in-process callback synchronously (spec §4.9).
//! No stdio redirection beyond what the closure does itself; cancellation
//! is propagated via the cancel token and plugins are expected to respect
//! it.

use std::sync::Arc;

use crate::action::{Action, FnHandler};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

pub struct FunctionExecutor {
    handler: FnHandler,
}

impl FunctionExecutor {
    pub fn new(handler: FnHandler) -> Self {
        Self { handler }
    }

    pub async fn execute(&self, action: Arc<Action>, mut cancel: CancelToken) -> Result<i32> {
        let fut = (self.handler)(action);
        tokio::select! {
            result = fut => result.map_err(|e| Error::RuntimeFailure {
                message: "function runtime returned an error".into(),
                source: Some(e),
            }),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn invokes_registered_closure() {
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let handler: FnHandler = Arc::new(move |_action| {
            let called = called2.clone();
            Box::pin(async move {
                called.store(true, Ordering::SeqCst);
                Ok(0)
            })
        });
        let action = Arc::new(Action::new(
            "id".into(),
            PathBuf::from("/a/action.yaml"),
            PathBuf::from("/a"),
            PathBuf::from("/"),
            b"action: {title: T}\nruntime: {type: plugin, id: test}\n".to_vec(),
        ));
        let executor = FunctionExecutor::new(handler);
        let (_h, token) = crate::cancel::channel();
        let code = executor.execute(action, token).await.unwrap();
        assert_eq!(code, 0);
        assert!(called.load(Ordering::SeqCst));
    }
}
