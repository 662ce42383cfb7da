//! Signature - タスク 1 回分の呼び出し記述子（current schema）
//!
//! Continuations (`on_success`, `on_error`, `chord_callback`) are owned by
//! their parent: the graph is a tree of values, never shared mutable aliases.
//! `Signature` does not implement `Clone`; duplicate one with
//! [`copy_signature`](super::copy::copy_signature), which validates the
//! graph while copying.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::arg::Arg;
use super::copy::{self, CopyLimits};
use super::errors::SignatureError;
use super::headers::Headers;
use super::ids::{GroupId, SignatureId};
use crate::ports::id_generator::{IdGenerator, UuidGenerator};

/// A single task invocation.
///
/// Fields are written in snake_case. Payloads from older producers that use
/// the capitalised names (`UUID`, `OnSuccess`, ...) and `null` for empty
/// lists and maps are accepted as well.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(alias = "UUID")]
    pub id: SignatureId,

    /// Name of the handler registered on the worker side.
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "RoutingKey")]
    pub routing_key: Option<String>,

    /// Not eligible for execution before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ETA")]
    pub eta: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "GroupUUID")]
    pub group_id: Option<GroupId>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "GroupTaskCount")]
    pub group_task_count: Option<u32>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty",
        alias = "Args"
    )]
    pub args: Vec<Arg>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Headers::is_empty",
        alias = "Headers"
    )]
    pub headers: Headers,

    /// Higher means more urgent; interpretation is up to the scheduler.
    #[serde(default, alias = "Priority")]
    pub priority: u8,

    /// When set, the parent's result is not spliced into this task's args.
    #[serde(default, alias = "Immutable")]
    pub immutable: bool,

    #[serde(default, alias = "RetryCount")]
    pub retry_count: u32,

    /// Seconds.
    #[serde(default, alias = "RetryTimeout")]
    pub retry_timeout: u32,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty",
        alias = "OnSuccess"
    )]
    pub on_success: Vec<Signature>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty",
        alias = "OnError"
    )]
    pub on_error: Vec<Signature>,

    /// Fired once every member of this task's group has completed.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ChordCallback")]
    pub chord_callback: Option<Box<Signature>>,

    /// Message group for FIFO brokers.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "BrokerMessageGroupId")]
    pub broker_message_group_id: Option<String>,

    /// Opaque acknowledgement token of the delivery that carried this task.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "SQSReceiptHandle")]
    pub source_receipt_handle: Option<String>,

    /// Leave the broker message in place on failure so it reaches the
    /// dead-letter queue.
    #[serde(default, alias = "StopTaskDeletionOnError")]
    pub suppress_deletion_on_error: bool,

    /// Drop the task instead of requeueing it when no handler is registered.
    #[serde(default, alias = "IgnoreWhenTaskNotRegistered")]
    pub ignore_when_unregistered: bool,
}

impl Signature {
    /// Create a signature with a fresh random `task_<uuid>` id.
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Result<Self, SignatureError> {
        Self::new_with(&UuidGenerator, name, args)
    }

    /// Create a signature, taking its id from `ids`.
    pub fn new_with<G: IdGenerator + ?Sized>(
        ids: &G,
        name: impl Into<String>,
        args: Vec<Arg>,
    ) -> Result<Self, SignatureError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SignatureError::EmptyName);
        }
        let id = ids.generate_signature_id()?;
        Ok(Self::from_parts(id, name, args))
    }

    /// Every field other than `id`, `name` and `args` at its default.
    fn from_parts(id: SignatureId, name: String, args: Vec<Arg>) -> Self {
        Self {
            id,
            name,
            routing_key: None,
            eta: None,
            group_id: None,
            group_task_count: None,
            args,
            headers: Headers::new(),
            priority: 0,
            immutable: false,
            retry_count: 0,
            retry_timeout: 0,
            on_success: Vec::new(),
            on_error: Vec::new(),
            chord_callback: None,
            broker_message_group_id: None,
            source_receipt_handle: None,
            suppress_deletion_on_error: false,
            ignore_when_unregistered: false,
        }
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn with_retry(mut self, retry_count: u32, retry_timeout: u32) -> Self {
        self.retry_count = retry_count;
        self.retry_timeout = retry_timeout;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(key, value);
        self
    }

    pub fn with_on_success(mut self, continuation: Signature) -> Self {
        self.on_success.push(continuation);
        self
    }

    pub fn with_on_error(mut self, continuation: Signature) -> Self {
        self.on_error.push(continuation);
        self
    }

    pub fn with_chord_callback(mut self, callback: Signature) -> Self {
        self.chord_callback = Some(Box::new(callback));
        self
    }

    pub fn with_broker_message_group_id(mut self, group: impl Into<String>) -> Self {
        self.broker_message_group_id = Some(group.into());
        self
    }

    pub fn with_ignore_when_unregistered(mut self, ignore: bool) -> Self {
        self.ignore_when_unregistered = ignore;
        self
    }

    /// Both a group id and a group task count are present.
    pub fn is_group_member(&self) -> bool {
        self.group_id.is_some() && self.group_task_count.is_some()
    }

    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.eta.is_none_or(|eta| eta <= now)
    }

    /// Check that no continuation repeats the id of one of its ancestors.
    /// Depth is not limited; use [`copy_signature_with`](super::copy::copy_signature_with)
    /// for a bounded check.
    pub fn validate_graph(&self) -> Result<(), SignatureError> {
        copy::validate_with(self, CopyLimits::default())
    }

    /// Decode a signature of any nesting depth.
    ///
    /// `serde_json::from_str` stops at 128 levels of nesting, and every chain
    /// step costs two (the object and its `on_success` array), so chains longer
    /// than about 60 steps fail there with "recursion limit exceeded". This
    /// decoder lifts that limit; deep input then only costs stack.
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        let mut de = serde_json::Deserializer::from_str(input);
        de.disable_recursion_limit();
        let signature = Self::deserialize(&mut de)?;
        de.end()?;
        Ok(signature)
    }

    pub fn from_json_slice(input: &[u8]) -> Result<Self, serde_json::Error> {
        let mut de = serde_json::Deserializer::from_slice(input);
        de.disable_recursion_limit();
        let signature = Self::deserialize(&mut de)?;
        de.end()?;
        Ok(signature)
    }

    /// Independent copy for the next delivery attempt.
    ///
    /// `retry_count` is decremented (saturating) and the receipt handle of the
    /// previous delivery is cleared. `self` is left untouched.
    pub fn for_retry(&self) -> Result<Self, SignatureError> {
        let mut next = copy::copy_signature(self)?;
        next.retry_count = next.retry_count.saturating_sub(1);
        next.source_receipt_handle = None;
        Ok(next)
    }
}

/// `null` decodes as the type's default, the way older producers encode
/// empty lists and maps.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
