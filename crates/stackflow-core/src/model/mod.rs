//! モデル定義
//!
//! ワークロードマニフェストのデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod action;
mod common;
mod job;
mod overlay;
mod schedule;
mod service;
mod validate;
mod workload;

// Re-exports
pub use action::*;
pub use common::*;
pub use job::*;
pub use overlay::Overlay;
pub use schedule::{aws_schedule_expression, parse_duration};
pub use service::*;
pub use validate::RESERVED_VARIABLE_PREFIX;
pub use workload::*;

pub(crate) use validate::{DEFAULT_CPU, DEFAULT_LOG_RETENTION, DEFAULT_MEMORY};
