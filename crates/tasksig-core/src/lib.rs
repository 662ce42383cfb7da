//! tasksig-core
//!
//! Task signatures: the serializable descriptor of one unit of work, its
//! continuation graph, and the operations other components rely on.
//!
//! # モジュール構成
//! - **domain**: Signature / Arg / Headers、deep copy、legacy schema からの移行、workflow 合成
//! - **ports**: 注入される capability（IdGenerator）
//!
//! Every operation here is synchronous and in-memory. Broker delivery,
//! execution and retry scheduling live outside this crate.

pub mod domain;
pub mod ports;

pub use domain::{
    Arg, ArgValue, Headers, LegacyHeaders, LegacySignature, Signature, SignatureError,
    SignatureId, copy_signature, copy_signatures, convert_to_current_schema,
};
