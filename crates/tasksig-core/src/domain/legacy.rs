//! LegacySignature - 旧スキーマ（single-valued headers）の入力アダプタ
//!
//! 旧 producer や永続化済みの状態から読み込んだ signature を、
//! パイプラインに入る前に一度だけ current schema に変換します。
//! 新規に構築することは想定していません。
//!
//! # Header の変換は意図的に lossy
//! 旧 headers は型なしの値の袋でした。trace propagation で意味を持つのは文字列値だけなので、
//! 文字列以外の値はエラーにもログにもせず捨てます。
//! 下流がこの挙動に依存している可能性があるため、「修正」しないこと。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::arg::Arg;
use super::errors::SignatureError;
use super::headers::{Headers, LegacyHeaders};
use super::ids::{GroupId, SignatureId};
use super::signature::{Signature, null_as_default};

/// Same field set as [`Signature`], with the untyped single-valued header map.
///
/// `id` and `name` are required on the wire. Keys are accepted in snake_case
/// or in the capitalised form older producers emit; any other key is an
/// error so that a misspelt field is not silently defaulted.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacySignature {
    #[serde(alias = "UUID")]
    pub id: SignatureId,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "RoutingKey")]
    pub routing_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ETA")]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "GroupUUID")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "GroupTaskCount")]
    pub group_task_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default", alias = "Args")]
    pub args: Vec<Arg>,
    #[serde(default, deserialize_with = "null_as_default", alias = "Headers")]
    pub headers: LegacyHeaders,
    #[serde(default, alias = "Priority")]
    pub priority: u8,
    #[serde(default, alias = "Immutable")]
    pub immutable: bool,
    #[serde(default, alias = "RetryCount")]
    pub retry_count: u32,
    #[serde(default, alias = "RetryTimeout")]
    pub retry_timeout: u32,
    #[serde(default, deserialize_with = "null_as_default", alias = "OnSuccess")]
    pub on_success: Vec<Signature>,
    #[serde(default, deserialize_with = "null_as_default", alias = "OnError")]
    pub on_error: Vec<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ChordCallback")]
    pub chord_callback: Option<Box<Signature>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "BrokerMessageGroupId"
    )]
    pub broker_message_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "SQSReceiptHandle")]
    pub source_receipt_handle: Option<String>,
    #[serde(default, alias = "StopTaskDeletionOnError")]
    pub suppress_deletion_on_error: bool,
    #[serde(default, alias = "IgnoreWhenTaskNotRegistered")]
    pub ignore_when_unregistered: bool,
}

impl LegacySignature {
    /// Move every field into a current-schema [`Signature`].
    ///
    /// Only string-valued headers survive; a key is appended to, never
    /// overwritten. Continuations and args are moved, not copied: call
    /// [`copy_signature`](super::copy::copy_signature) on the result if an
    /// independent graph is needed.
    pub fn convert_to_current_schema(self) -> Result<Signature, SignatureError> {
        let headers = Headers::from_reader(&self.headers)?;

        let LegacySignature {
            id,
            name,
            routing_key,
            eta,
            group_id,
            group_task_count,
            args,
            headers: _,
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
        } = self;

        Ok(Signature {
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
        })
    }
}

impl TryFrom<LegacySignature> for Signature {
    type Error = SignatureError;

    fn try_from(legacy: LegacySignature) -> Result<Self, Self::Error> {
        legacy.convert_to_current_schema()
    }
}

/// Free-function form of [`LegacySignature::convert_to_current_schema`].
pub fn convert_to_current_schema(legacy: LegacySignature) -> Result<Signature, SignatureError> {
    legacy.convert_to_current_schema()
}
