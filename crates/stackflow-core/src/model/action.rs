//! 環境コントローラーのアクション定義

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ワークロードが共有環境に要求するアクション
///
/// 各アクションは環境スタックのパラメータ（ワークロード名の集合）に対応し、
/// 集合が空でない間だけ環境側で共有リソースが作られる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ControllerAction {
    /// インターネット向けロードバランサー
    PublicLoadBalancer,
    /// 内部ロードバランサー
    InternalLoadBalancer,
    /// プライベートサブネット用の NAT ゲートウェイ
    NatGateway,
    /// 環境管理の EFS ファイルシステム
    SharedFilesystem,
    /// サービスディスカバリの名前空間への登録
    ServiceDiscovery,
}

impl ControllerAction {
    pub const ALL: [ControllerAction; 5] = [
        Self::PublicLoadBalancer,
        Self::InternalLoadBalancer,
        Self::NatGateway,
        Self::SharedFilesystem,
        Self::ServiceDiscovery,
    ];

    /// 環境スタックのパラメータ名
    pub fn env_parameter(&self) -> &'static str {
        match self {
            Self::PublicLoadBalancer => "ALBWorkloads",
            Self::InternalLoadBalancer => "InternalALBWorkloads",
            Self::NatGateway => "NATWorkloads",
            Self::SharedFilesystem => "EFSWorkloads",
            Self::ServiceDiscovery => "ServiceDiscoveryWorkloads",
        }
    }
}

impl fmt::Display for ControllerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_parameter())
    }
}

impl FromStr for ControllerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.env_parameter() == s)
            .ok_or_else(|| format!("unknown environment controller action: {s}"))
    }
}
