//! 服务配置集合

use super::iam::IamConfig;
use serde::{Deserialize, Serialize};

/// 所有服务的配置集合
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ServicesConfig {
    /// KS (Key Store) 配置：密钥存储与主密钥来源
    #[serde(default)]
    pub ks: ks::KsServiceConfig,

    /// IAM 凭证服务配置
    #[serde(default)]
    pub iam: IamConfig,
}
