//! Deep copy of signature graphs.
//!
//! A copy owns every nested argument, header value and continuation, so the
//! copy and the source can be mutated independently (e.g. by a retry while
//! the original is still being logged).
//!
//! The traversal fails fast instead of diverging:
//! - a continuation whose id equals one of its ancestors' is a cycle;
//! - with an explicit [`CopyLimits::max_depth`], deeper nesting is rejected.
//!
//! The default limits are unbounded: any acyclic graph can be copied.
//!
//! Nothing is returned on failure; a partially built copy is dropped.

use serde::{Deserialize, Serialize};

use super::errors::SignatureError;
use super::ids::SignatureId;
use super::signature::Signature;

/// Traversal limits for copying and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyLimits {
    /// Deepest continuation level accepted. The root is level 0.
    /// `None` accepts any depth.
    pub max_depth: Option<usize>,
}

impl CopyLimits {
    pub fn unbounded() -> Self {
        Self { max_depth: None }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
        }
    }
}

impl Default for CopyLimits {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Copy one signature with the default limits.
pub fn copy_signature(signature: &Signature) -> Result<Signature, SignatureError> {
    copy_signature_with(signature, CopyLimits::default())
}

pub fn copy_signature_with(
    signature: &Signature,
    limits: CopyLimits,
) -> Result<Signature, SignatureError> {
    Walker::new(limits).copy(signature)
}

/// Copy every signature, preserving order. Fails as a whole if any element fails.
pub fn copy_signatures<'a, I>(signatures: I) -> Result<Vec<Signature>, SignatureError>
where
    I: IntoIterator<Item = &'a Signature>,
{
    signatures.into_iter().map(copy_signature).collect()
}

pub(crate) fn validate_with(signature: &Signature, limits: CopyLimits) -> Result<(), SignatureError> {
    Walker::new(limits).visit(signature)
}

/// Depth-first traversal tracking the ids on the current path.
struct Walker {
    limits: CopyLimits,
    ancestors: Vec<SignatureId>,
}

impl Walker {
    fn new(limits: CopyLimits) -> Self {
        Self {
            limits,
            ancestors: Vec::new(),
        }
    }

    fn enter(&mut self, signature: &Signature) -> Result<(), SignatureError> {
        let depth = self.ancestors.len();
        if let Some(limit) = self.limits.max_depth.filter(|&limit| depth > limit) {
            return Err(SignatureError::CopyDepthExceeded { limit });
        }
        // Legacy producers may leave ids empty; those cannot be told apart.
        if !signature.id.is_empty() && self.ancestors.contains(&signature.id) {
            tracing::trace!(id = %signature.id, "continuation cycle");
            return Err(SignatureError::CopyCycle {
                id: signature.id.clone(),
            });
        }
        self.ancestors.push(signature.id.clone());
        Ok(())
    }

    fn leave(&mut self) {
        self.ancestors.pop();
    }

    fn visit(&mut self, signature: &Signature) -> Result<(), SignatureError> {
        self.enter(signature)?;
        for child in children(signature) {
            self.visit(child)?;
        }
        self.leave();
        Ok(())
    }

    fn copy(&mut self, signature: &Signature) -> Result<Signature, SignatureError> {
        self.enter(signature)?;
        let copied = self.copy_fields(signature)?;
        self.leave();
        Ok(copied)
    }

    fn copy_fields(&mut self, signature: &Signature) -> Result<Signature, SignatureError> {
        // Destructured so that a new field cannot be forgotten here.
        let Signature {
            id,
            name,
            routing_key,
            eta,
            group_id,
            group_task_count,
            args,
            headers,
            priority,
            immutable,
            retry_count,
            retry_timeout,
            on_success,
            on_error,
            chord_callback,
            broker_message_group_id,
            source_receipt_handle,
            suppress_deletion_on_error,
            ignore_when_unregistered,
        } = signature;

        let on_success = self.copy_all(on_success)?;
        let on_error = self.copy_all(on_error)?;
        let chord_callback = match chord_callback {
            Some(callback) => Some(Box::new(self.copy(callback)?)),
            None => None,
        };

        Ok(Signature {
            id: id.clone(),
            name: name.clone(),
            routing_key: routing_key.clone(),
            eta: *eta,
            group_id: group_id.clone(),
            group_task_count: *group_task_count,
            args: args.clone(),
            headers: headers.clone(),
            priority: *priority,
            immutable: *immutable,
            retry_count: *retry_count,
            retry_timeout: *retry_timeout,
            on_success,
            on_error,
            chord_callback,
            broker_message_group_id: broker_message_group_id.clone(),
            source_receipt_handle: source_receipt_handle.clone(),
            suppress_deletion_on_error: *suppress_deletion_on_error,
            ignore_when_unregistered: *ignore_when_unregistered,
        })
    }

    fn copy_all(&mut self, signatures: &[Signature]) -> Result<Vec<Signature>, SignatureError> {
        signatures.iter().map(|s| self.copy(s)).collect()
    }
}

fn children(signature: &Signature) -> impl Iterator<Item = &Signature> {
    signature
        .on_success
        .iter()
        .chain(signature.on_error.iter())
        .chain(signature.chord_callback.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arg::Arg;
    use crate::ports::id_generator::SequenceGenerator;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn sig(ids: &SequenceGenerator, name: &str) -> Signature {
        Signature::new_with(ids, name, vec![Arg::new("n", 1_i64)]).unwrap()
    }

    /// a -> (on_success b -> on_success c), on_error e, chord k
    fn sample() -> Signature {
        let ids = SequenceGenerator::new();
        let c = sig(&ids, "c").with_retry(1, 5);
        let b = sig(&ids, "b").with_retry(2, 5).with_on_success(c);
        sig(&ids, "a")
            .with_header("trace-id", "abc")
            .with_routing_key("mail")
            .with_eta(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_on_success(b)
            .with_on_error(sig(&ids, "e"))
            .with_chord_callback(sig(&ids, "k"))
    }

    #[test]
    fn copy_is_structurally_equal() {
        let s = sample();
        let c = copy_signature(&s).unwrap();
        assert_eq!(c, s);
    }

    #[test]
    fn mutating_the_copy_leaves_the_source_untouched() {
        let s = sample();
        let mut c = copy_signature(&s).unwrap();

        c.on_success[0].retry_count = 99;
        c.on_success[0].on_success[0].name = "changed".into();
        c.headers.add("trace-id", "other");
        c.chord_callback.as_mut().unwrap().priority = 9;
        c.args.clear();

        assert_eq!(s.on_success[0].retry_count, 2);
        assert_eq!(s.on_success[0].on_success[0].name, "c");
        assert_eq!(s.headers.get_all("trace-id"), ["abc"]);
        assert_eq!(s.chord_callback.as_ref().unwrap().priority, 0);
        assert_eq!(s.args.len(), 1);
    }

    #[test]
    fn mutating_the_source_leaves_the_copy_untouched() {
        let mut s = sample();
        let c = copy_signature(&s).unwrap();

        s.on_success[0].retry_count = 0;
        s.source_receipt_handle = Some("r".into());

        assert_eq!(c.on_success[0].retry_count, 2);
        assert_eq!(c.source_receipt_handle, None);
    }

    #[test]
    fn double_copy_is_idempotent_and_independent() {
        let s = sample();
        let once = copy_signature(&s).unwrap();
        let mut twice = copy_signature(&once).unwrap();
        assert_eq!(twice, once);

        twice.on_error[0].retry_count = 7;
        assert_eq!(once.on_error[0].retry_count, 0);
        assert_eq!(s.on_error[0].retry_count, 0);
    }

    #[test]
    fn copy_signatures_preserves_order() {
        let ids = SequenceGenerator::new();
        let sigs = vec![sig(&ids, "first"), sig(&ids, "second"), sig(&ids, "third")];

        let copies = copy_signatures(&sigs).unwrap();

        let names: Vec<_> = copies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert_eq!(copies, sigs);
    }

    #[test]
    fn self_referencing_id_is_reported_as_cycle() {
        let ids = SequenceGenerator::new();
        let mut root = sig(&ids, "loop");
        let again = copy_signature(&root).unwrap();
        root.on_success.push(sig(&ids, "middle").with_on_error(again));

        let err = copy_signature(&root).unwrap_err();
        assert!(matches!(err, SignatureError::CopyCycle { ref id } if *id == root.id));
        assert!(root.validate_graph().is_err());
    }

    #[test]
    fn shared_ids_in_sibling_branches_are_not_cycles() {
        let ids = SequenceGenerator::new();
        let callback = sig(&ids, "notify");
        let twin = copy_signature(&callback).unwrap();
        let root = sig(&ids, "root")
            .with_on_success(callback)
            .with_on_error(twin);

        assert!(copy_signature(&root).is_ok());
    }

    #[test]
    fn empty_legacy_ids_do_not_trigger_cycle_detection() {
        let mut inner = sig(&SequenceGenerator::new(), "inner");
        inner.id = SignatureId::default();
        let mut outer = sig(&SequenceGenerator::new(), "outer").with_on_success(inner);
        outer.id = SignatureId::default();

        assert!(copy_signature(&outer).is_ok());
    }

    #[test]
    fn depth_limit_fails_fast() {
        let ids = SequenceGenerator::new();
        let mut tail = sig(&ids, "level-3");
        for level in (0..3).rev() {
            tail = sig(&ids, &format!("level-{level}")).with_on_success(tail);
        }

        let limits = CopyLimits::with_max_depth(2);
        let err = copy_signature_with(&tail, limits).unwrap_err();
        assert!(matches!(err, SignatureError::CopyDepthExceeded { limit: 2 }));

        let limits = CopyLimits::with_max_depth(3);
        assert!(copy_signature_with(&tail, limits).is_ok());
    }

    #[test]
    fn failure_in_one_element_fails_the_batch() {
        let ids = SequenceGenerator::new();
        let mut bad = sig(&ids, "bad");
        let again = copy_signature(&bad).unwrap();
        bad.on_success.push(again);

        let res = copy_signatures([&sig(&ids, "ok"), &bad]);
        assert!(res.is_err());
    }

    #[test]
    fn limits_deserialize_with_defaults() {
        let limits: CopyLimits = serde_json::from_str("{}").unwrap();
        assert_eq!(limits, CopyLimits::unbounded());

        let limits: CopyLimits = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(limits, CopyLimits::with_max_depth(8));
    }

    #[test]
    fn long_chains_copy_and_retry_without_a_depth_cap() {
        let ids = SequenceGenerator::new();
        let steps: Vec<_> = (0..150).map(|n| sig(&ids, &format!("step-{n}"))).collect();
        let head = crate::domain::workflow::chain(steps).unwrap();

        let copied = copy_signature(&head).unwrap();
        assert_eq!(copied, head);
        assert!(head.validate_graph().is_ok());

        let retry = head.for_retry().unwrap();
        let mut depth = 0;
        let mut node = &retry;
        while let Some(next) = node.on_success.first() {
            node = next;
            depth += 1;
        }
        assert_eq!(depth, 149);
        assert_eq!(node.name, "step-149");
    }

    #[tokio::test]
    async fn concurrent_copies_do_not_observe_each_other() {
        let shared = Arc::new(sample());

        let handles: Vec<_> = (0..8u32)
            .map(|n| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let mut mine = copy_signature(&shared).unwrap();
                    mine.on_success[0].retry_count = n;
                    mine.source_receipt_handle = Some(format!("receipt-{n}"));
                    mine
                })
            })
            .collect();

        for (n, handle) in handles.into_iter().enumerate() {
            let mine = handle.await.unwrap();
            assert_eq!(mine.on_success[0].retry_count, n as u32);
            assert_eq!(mine.source_receipt_handle, Some(format!("receipt-{n}")));
        }

        assert_eq!(shared.on_success[0].retry_count, 2);
        assert_eq!(shared.source_receipt_handle, None);
    }
}
