mod client;
mod dispatcher;
mod error;
mod model;
mod provider;
mod server;

use rmcp::{ServiceExt, transport::stdio};

use provider::{CredentialProvider, WechatArticlesProvider};
use server::WechatArticlesServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志（输出到 stderr，避免干扰 stdout 上的 MCP 协议通信）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting WeChat Articles MCP Server...");

    // 启用前的凭证校验（微信公众号工具无需平台级凭证，始终通过）
    WechatArticlesProvider.validate_credentials(&serde_json::Map::new())?;

    // 创建服务器实例并通过 stdio 传输启动 MCP 服务
    let service = WechatArticlesServer::new()
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to start MCP server: {}", e);
        })?;

    // 阻塞等待服务结束
    service.waiting().await?;

    tracing::info!("WeChat Articles MCP Server stopped.");
    Ok(())
}
