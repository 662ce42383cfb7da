//! IdGenerator port - ID 生成の抽象化
//!
//! Signature の ID は構築時に一度だけ割り当てられます。
//! テストで決定的な ID を使えるように、生成器は trait として注入します。
//!
//! # 実装
//! - **UuidGenerator**: OS の乱数から UUID v4 を生成（本番用）
//! - **SequenceGenerator**: カウンタから UUID v4 形式を生成（テスト用）

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use uuid::{Builder, Uuid};

use crate::domain::ids::{GroupId, SignatureId};

/// The entropy source behind ID generation failed.
///
/// Not retryable at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unique id generation failed: {reason}")]
pub struct IdGenerationError {
    reason: String,
}

impl IdGenerationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// IdGenerator は UUID ベースの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから同時に使える）
pub trait IdGenerator: Send + Sync {
    fn generate_uuid(&self) -> Result<Uuid, IdGenerationError>;

    fn generate_signature_id(&self) -> Result<SignatureId, IdGenerationError> {
        self.generate_uuid().map(SignatureId::from_uuid)
    }

    fn generate_group_id(&self) -> Result<GroupId, IdGenerationError> {
        self.generate_uuid().map(GroupId::from_uuid)
    }
}

/// Random (v4) UUIDs from the operating system's entropy source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate_uuid(&self) -> Result<Uuid, IdGenerationError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| IdGenerationError::new(e.to_string()))?;
        Ok(Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// Deterministic generator: the n-th call yields the v4-shaped UUID whose
/// random bits encode `n`.
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequenceGenerator {
    fn generate_uuid(&self) -> Result<Uuid, IdGenerationError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(Builder::from_random_bytes(u128::from(n).to_be_bytes()).into_uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_generator_generates_unique_v4_ids() {
        let id_gen = UuidGenerator;

        let ids: HashSet<SignatureId> = (0..1000)
            .map(|_| id_gen.generate_signature_id().unwrap())
            .collect();
        assert_eq!(ids.len(), 1000);

        for id in &ids {
            assert_eq!(id.uuid().unwrap().get_version_num(), 4);
        }
    }

    #[test]
    fn sequence_generator_is_deterministic() {
        let id_gen = SequenceGenerator::new();

        let first = id_gen.generate_signature_id().unwrap();
        let second = id_gen.generate_group_id().unwrap();

        assert_eq!(first.as_str(), "task_00000000-0000-4000-8000-000000000001");
        assert_eq!(second.as_str(), "group_00000000-0000-4000-8000-000000000002");
    }

    #[test]
    fn generator_is_usable_as_trait_object() {
        let id_gen: Box<dyn IdGenerator> = Box::new(SequenceGenerator::starting_at(7));
        let id = id_gen.generate_signature_id().unwrap();
        assert!(id.as_str().ends_with("000000000007"));
    }
}
