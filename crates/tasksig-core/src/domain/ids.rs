//! Signature identifiers (strongly-typed string IDs).
//!
//! Signature の ID は `task_<uuid>`、Group の ID は `group_<uuid>` という形式の文字列です。
//! Wire 上ではただの文字列として運ばれるので `#[serde(transparent)]` で serialize します。
//!
//! 古い producer や呼び出し側が ID を付け替えることもあるため、
//! 任意の文字列から作ることもできます（形式の検証はしません）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display / 生成時に使うプレフィックス（"task_", "group_"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic prefixed string ID.
///
/// `T` is a zero-sized marker, so `SignatureId` and `GroupId` cannot be mixed up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Wrap an existing identifier verbatim.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Build the canonical `<prefix><uuid>` form.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self::new(format!("{}{}", T::prefix(), uuid.hyphenated()))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Legacy signatures may arrive without an ID.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The UUID part, if this ID is in canonical form.
    pub fn uuid(&self) -> Option<Uuid> {
        self.value
            .strip_prefix(T::prefix())
            .and_then(|rest| Uuid::parse_str(rest).ok())
    }
}

impl<T: IdMarker> Default for Id<T> {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl<T: IdMarker> From<Uuid> for Id<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task signature のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task_"
    }
}

/// Group のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {}

impl IdMarker for Group {
    fn prefix() -> &'static str {
        "group_"
    }
}

/// Identifier of a task signature.
pub type SignatureId = Id<Task>;

/// Identifier shared by every member of a fan-out group.
pub type GroupId = Id<Group>;
