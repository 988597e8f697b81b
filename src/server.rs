use std::sync::Arc;

use std::future::Future;

use rmcp::{
    ServerHandler,
    handler::server::tool::{Parameters, ToolRouter},
    model::*,
    tool, tool_handler, tool_router,
};

use crate::client::HttpGateway;
use crate::dispatcher::{ActionDispatcher, InvocationRequest};
use crate::model::OutputMessage;

/// MCP 服务器结构体
#[derive(Clone)]
pub struct WechatArticlesServer {
    dispatcher: Arc<ActionDispatcher<HttpGateway>>,
    tool_router: ToolRouter<Self>,
}

impl WechatArticlesServer {
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(ActionDispatcher::new(HttpGateway::new())),
            tool_router: Self::tool_router(),
        }
    }
}

/// 工具方法定义
#[tool_router]
impl WechatArticlesServer {
    /// 公众号文章数据获取
    #[tool(description = "获取微信公众号文章数据。action=get_article_urls 列出公众号最近发布的文章链接\
        （需要 cookie/token/nickname/biz）；action=get_article_details 获取单篇文章的精选评论与\
        阅读/点赞数（额外需要 appmsg_token/wechat_cookie/article_url）。")]
    async fn wechat_articles(
        &self,
        Parameters(req): Parameters<InvocationRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let messages = self.dispatcher.invoke(req).await;

        // 按产生顺序转成内容条目，JSON 消息紧凑序列化
        let contents = messages
            .into_iter()
            .map(|message| match message {
                OutputMessage::Text(text) => Content::text(text),
                OutputMessage::Json(payload) => Content::text(payload.to_string()),
            })
            .collect();

        Ok(CallToolResult::success(contents))
    }
}

/// 实现 MCP 协议处理器
#[tool_handler]
impl ServerHandler for WechatArticlesServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "微信公众号文章数据 MCP 服务。提供 wechat_articles 工具：\
                 获取公众号最近发布的文章链接列表，或单篇文章的精选评论与阅读/点赞数据。"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
