//! # stackflow-core
//!
//! ワークロードマニフェストと環境オーバーライドから
//! CloudFormation テンプレートとスタックパラメータを生成するコアライブラリ。
//!
//! 典型的な流れ:
//!
//! 1. [`Workload::from_yaml`] でマニフェストを読む
//! 2. [`Workload::apply_env`] で環境オーバーライドを適用する
//! 3. [`ResolvedManifest::validate`] と [`ResolvedManifest::load`] を順に呼ぶ
//! 4. [`addon::parse`] でアドオンを読み込む（無ければ `NotFound`）
//! 5. [`WorkloadStack`] からテンプレートとパラメータを取り出す

pub mod addon;
pub mod error;
pub mod model;
pub mod resolve;
pub mod runtime;
pub mod stack;
pub mod template;
pub mod workspace;

pub use addon::{AddonError, AddonFragment, AddonOutput};
pub use error::{FlowError, Result};
pub use model::*;
pub use resolve::{DEFAULT_IMAGE_TAG, ResolvedManifest, Session, Stage, TaskSettings};
pub use runtime::{AgentLocation, RuntimeContext};
pub use stack::{Parameters, WorkloadStack};
pub use template::TemplateRenderer;
pub use workspace::Workspace;
