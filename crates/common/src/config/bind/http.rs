use serde::{Deserialize, Serialize};

/// HTTP 服务绑定配置
///
/// TLS 由前置网关终结，服务本身只监听明文 HTTP。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpBindConfig {
    /// 绑定 IP 地址
    ///
    /// 服务实际绑定的网络接口 IP 地址。
    /// 通常使用 "0.0.0.0" 监听所有接口。
    #[serde(default = "default_ip")]
    pub ip: String,

    /// 绑定端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpBindConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
        }
    }
}
