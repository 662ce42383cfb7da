//! In-process dispatcher: looks a signature's handler up by name, runs it,
//! and decides what has to be enqueued next.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tasksig_core::domain::{Arg, Signature, SignatureError, copy_signatures};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate handler for task name={0}")]
    DuplicateHandler(String),
}

/// A handler for one task name.
///
/// Returns the task's results, which are spliced in front of the args of
/// mutable `on_success` continuations.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, args: &[Arg]) -> Result<Vec<Arg>, String>;
}

/// Registry of handlers (task name -> handler).
///
/// Built during initialization, read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A name can be registered once; a second registration is an error.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(name)
    }
}

/// What the worker should do after one dispatch.
#[derive(Debug)]
pub enum Dispatch {
    /// Handler succeeded; enqueue these continuations.
    Succeeded(Vec<Signature>),
    /// Handler failed with retries left; enqueue this copy again.
    Retry(Signature),
    /// Handler failed for good; enqueue these error continuations.
    Failed(Vec<Signature>),
    /// No handler, and the signature asks to be dropped in that case.
    Dropped,
    /// No handler; put the signature back untouched.
    Requeue(Signature),
}

pub async fn dispatch(
    registry: &HandlerRegistry,
    signature: Signature,
) -> Result<Dispatch, SignatureError> {
    let Some(handler) = registry.get(&signature.name) else {
        if signature.ignore_when_unregistered {
            tracing::info!(id = %signature.id, name = %signature.name, "no handler, dropping");
            return Ok(Dispatch::Dropped);
        }
        tracing::info!(id = %signature.id, name = %signature.name, "no handler, requeueing");
        return Ok(Dispatch::Requeue(signature));
    };

    match handler.handle(&signature.args).await {
        Ok(results) => {
            let mut next = copy_signatures(&signature.on_success)?;
            for continuation in next.iter_mut().filter(|c| !c.immutable) {
                let mut args = results.clone();
                args.append(&mut continuation.args);
                continuation.args = args;
            }
            tracing::info!(id = %signature.id, name = %signature.name, next = next.len(), "succeeded");
            Ok(Dispatch::Succeeded(next))
        }
        Err(e) if signature.retry_count > 0 => {
            tracing::info!(
                id = %signature.id,
                retries_left = signature.retry_count - 1,
                error = %e,
                "failed, retrying"
            );
            Ok(Dispatch::Retry(signature.for_retry()?))
        }
        Err(e) => {
            let mut next = copy_signatures(&signature.on_error)?;
            for continuation in &mut next {
                continuation.args.insert(0, Arg::new("error", e.as_str()));
            }
            tracing::info!(id = %signature.id, name = %signature.name, error = %e, "failed");
            Ok(Dispatch::Failed(next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tasksig_core::domain::ArgValue;
    use tasksig_core::ports::SequenceGenerator;

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        async fn handle(&self, args: &[Arg]) -> Result<Vec<Arg>, String> {
            Ok(vec![Arg::new("echo", args.len() as i64)])
        }
    }

    struct Flaky {
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for Flaky {
        async fn handle(&self, _args: &[Arg]) -> Result<Vec<Arg>, String> {
            let left = self.remaining_failures.load(Ordering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(format!("intentional failure (left={left})"));
            }
            Ok(vec![])
        }
    }

    fn registry() -> HandlerRegistry {
        let mut reg = HandlerRegistry::new();
        reg.register("echo", Arc::new(Echo)).unwrap();
        reg.register(
            "flaky",
            Arc::new(Flaky {
                remaining_failures: AtomicU32::new(1),
            }),
        )
        .unwrap();
        reg
    }

    #[tokio::test]
    async fn registering_a_name_twice_is_rejected() {
        let mut reg = registry();
        let err = reg.register("echo", Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler(ref name) if name == "echo"));
        assert_eq!(err.to_string(), "duplicate handler for task name=echo");

        // the first handler stays in place
        let ids = SequenceGenerator::new();
        let sig = Signature::new_with(&ids, "echo", vec![]).unwrap();
        assert!(matches!(
            dispatch(&reg, sig).await.unwrap(),
            Dispatch::Succeeded(_)
        ));
    }

    #[tokio::test]
    async fn results_are_spliced_into_mutable_continuations_only() {
        let ids = SequenceGenerator::new();
        let sig = Signature::new_with(&ids, "echo", vec![Arg::new("x", 1_i64)])
            .unwrap()
            .with_on_success(
                Signature::new_with(&ids, "next", vec![Arg::new("own", "a")]).unwrap(),
            )
            .with_on_success(
                Signature::new_with(&ids, "frozen", vec![])
                    .unwrap()
                    .with_immutable(true),
            );

        let Dispatch::Succeeded(next) = dispatch(&registry(), sig).await.unwrap() else {
            panic!("expected success");
        };

        assert_eq!(next.len(), 2);
        let names: Vec<_> = next[0].args.iter().map(Arg::name).collect();
        assert_eq!(names, ["echo", "own"]);
        assert_eq!(next[0].args[0].value(), &ArgValue::Int64(1));
        assert!(next[1].args.is_empty());
    }

    #[tokio::test]
    async fn failure_with_retries_left_returns_a_decremented_copy() {
        let ids = SequenceGenerator::new();
        let mut sig = Signature::new_with(&ids, "flaky", vec![])
            .unwrap()
            .with_retry(2, 0);
        sig.source_receipt_handle = Some("receipt".into());

        let Dispatch::Retry(retry) = dispatch(&registry(), sig).await.unwrap() else {
            panic!("expected retry");
        };
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.source_receipt_handle, None);
    }

    #[tokio::test]
    async fn final_failure_spawns_error_continuations_with_the_error() {
        let ids = SequenceGenerator::new();
        let sig = Signature::new_with(&ids, "flaky", vec![])
            .unwrap()
            .with_on_error(Signature::new_with(&ids, "alert", vec![]).unwrap());

        let Dispatch::Failed(next) = dispatch(&registry(), sig).await.unwrap() else {
            panic!("expected failure");
        };
        assert_eq!(next[0].name, "alert");
        assert_eq!(next[0].args[0].name(), "error");
        assert!(next[0].args[0].value().as_str().unwrap().contains("intentional"));
    }

    #[tokio::test]
    async fn unregistered_tasks_are_dropped_or_requeued() {
        let ids = SequenceGenerator::new();
        let ignored = Signature::new_with(&ids, "missing", vec![])
            .unwrap()
            .with_ignore_when_unregistered(true);
        assert!(matches!(
            dispatch(&registry(), ignored).await.unwrap(),
            Dispatch::Dropped
        ));

        let kept = Signature::new_with(&ids, "missing", vec![]).unwrap();
        let id = kept.id.clone();
        let Dispatch::Requeue(back) = dispatch(&registry(), kept).await.unwrap() else {
            panic!("expected requeue");
        };
        assert_eq!(back.id, id);
    }
}
