//! Errors - エラー型と分類
//!
//! このクレートの操作はすべて同期・インメモリで、暗黙のリトライはしません。
//! エラーは直接の呼び出し元にそのまま返します。

use thiserror::Error;

use super::headers::PropagationError;
use super::ids::SignatureId;
use crate::ports::id_generator::IdGenerationError;

/// ErrorKind は運用上の分類
///
/// - Permanent: 入力やグラフ構造の問題（リトライ無意味）
/// - Infrastructure: 乱数源など実行環境の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error(transparent)]
    IdGeneration(#[from] IdGenerationError),

    #[error("signature name must not be empty")]
    EmptyName,

    #[error("legacy header migration failed: {0}")]
    MigrationIteration(#[from] PropagationError),

    #[error("continuation cycle detected: signature {id} is its own ancestor")]
    CopyCycle { id: SignatureId },

    #[error("continuation graph exceeds the maximum depth of {limit}")]
    CopyDepthExceeded { limit: usize },

    #[error("{0} needs at least one signature")]
    EmptyWorkflow(&'static str),

    #[error("group of {0} signatures exceeds the task count range")]
    GroupTooLarge(usize),
}

impl SignatureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IdGeneration(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Permanent,
        }
    }

    /// True for failures raised while deep-copying a signature graph.
    pub fn is_copy_failure(&self) -> bool {
        matches!(self, Self::CopyCycle { .. } | Self::CopyDepthExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generation_failure_is_infrastructure() {
        let err = SignatureError::from(IdGenerationError::new("entropy exhausted"));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.to_string().contains("entropy exhausted"));
    }

    #[test]
    fn graph_errors_are_permanent_copy_failures() {
        let err = SignatureError::CopyCycle {
            id: SignatureId::new("task_1"),
        };
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.is_copy_failure());
        assert!(!SignatureError::EmptyName.is_copy_failure());
    }
}
