use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单篇文章的摘要，与公众平台列表接口的记录一一对应。
/// 源记录缺字段时取空串 / 0。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    /// 发布/更新时间，epoch 秒
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub cover: String,
}

/// get_article_urls 的输出载荷
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleUrlsResult {
    pub articles: Vec<ArticleSummary>,
    pub total_count: usize,
}

impl From<Vec<ArticleSummary>> for ArticleUrlsResult {
    fn from(articles: Vec<ArticleSummary>) -> Self {
        let total_count = articles.len();
        Self {
            articles,
            total_count,
        }
    }
}

/// get_article_details 的输出载荷。评论记录原样透传，不做结构校验。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleDetailsResult {
    pub comments: Vec<Value>,
    pub read_num: i64,
    pub like_num: i64,
    pub old_like_num: i64,
}

/// 一次调用回给宿主的消息。宿主协议按流式处理，这里按产生顺序收集，
/// 调用结束即序列结束。
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    Text(String),
    Json(Value),
}

impl OutputMessage {
    pub fn text(msg: impl Into<String>) -> Self {
        OutputMessage::Text(msg.into())
    }

    pub fn json(payload: Value) -> Self {
        OutputMessage::Json(payload)
    }
}
