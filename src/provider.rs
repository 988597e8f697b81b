use serde_json::{Map, Value};

use crate::error::CredentialError;

/// 宿主在启用插件前调用的凭证校验接口。
/// 工具定义与工具调用仍由宿主运行时的默认实现承担，这里只声明凭证语义。
pub trait CredentialProvider {
    fn validate_credentials(
        &self,
        credentials: &Map<String, Value>,
    ) -> Result<(), CredentialError>;
}

/// 微信公众号文章工具的凭证提供方。
/// 凭证全部随调用参数传入，平台级凭证为空也能通过校验。
pub struct WechatArticlesProvider;

impl CredentialProvider for WechatArticlesProvider {
    fn validate_credentials(
        &self,
        _credentials: &Map<String, Value>,
    ) -> Result<(), CredentialError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_platform_credentials_required() {
        let provider = WechatArticlesProvider;
        assert!(provider.validate_credentials(&Map::new()).is_ok());

        let mut credentials = Map::new();
        credentials.insert("api_key".to_string(), Value::from("ignored"));
        assert!(provider.validate_credentials(&credentials).is_ok());
    }
}
