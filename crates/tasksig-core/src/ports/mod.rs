//! Ports - 抽象化レイヤー
//!
//! 外部から注入される capability を trait として定義します。
//! 現在は ID 生成のみ（テストで決定的な生成器に差し替えるため）。

pub mod id_generator;

pub use self::id_generator::{IdGenerationError, IdGenerator, SequenceGenerator, UuidGenerator};
