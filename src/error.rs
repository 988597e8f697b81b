use thiserror::Error;

/// 网关调用的错误分类。分类决定回给宿主的文案前缀（见 dispatcher），
/// Display 只携带细节本身。
#[derive(Error, Debug)]
pub enum GatewayError {
    /// 传输层失败（连接、超时、TLS 等）
    #[error("{0}")]
    Network(String),

    /// 取值无法按预期解析（响应体不是 JSON、URL 缺少必要参数等）
    #[error("{0}")]
    Value(String),

    /// 其余失败（接口拒绝、响应缺少约定字段等）
    #[error("{0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Network(e.to_string())
    }
}

/// 凭证校验失败。微信公众号工具无需平台级凭证，当前实现不会产生该错误，
/// 但插件契约保留它。
#[derive(Error, Debug)]
#[error("credential validation failed: {0}")]
pub struct CredentialError(pub String);
