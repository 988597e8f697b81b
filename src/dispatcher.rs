use rmcp::schemars;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ArticleGateway, PlatformCredentials, ReadCredentials, UrlListQuery};
use crate::error::GatewayError;
use crate::model::{ArticleDetailsResult, ArticleUrlsResult, OutputMessage};

/// 工具的请求参数。字段按动作分别校验，这里全部可选；
/// begin/count 保持原始 JSON 值，类型不对时作为校验错误上报而不是反序列化失败。
#[derive(Debug, Default, serde::Deserialize, schemars::JsonSchema)]
pub struct InvocationRequest {
    #[schemars(description = "要执行的动作：get_article_urls 或 get_article_details")]
    pub action: Option<String>,
    #[schemars(description = "文章列表的起始偏移，非负整数，默认 0")]
    pub begin: Option<Value>,
    #[schemars(description = "拉取的文章数量，1 到 5 的整数，默认 5")]
    pub count: Option<Value>,
    #[schemars(description = "公众平台网页版的 Cookie")]
    pub cookie: Option<String>,
    #[schemars(description = "公众平台网页版的 Token")]
    pub token: Option<String>,
    #[schemars(description = "公众号昵称")]
    pub nickname: Option<String>,
    #[schemars(description = "公众号的 biz 标识")]
    pub biz: Option<String>,
    #[schemars(description = "打开公众号文章时抓包得到的 appmsg_token（get_article_details 必填）")]
    pub appmsg_token: Option<String>,
    #[schemars(description = "打开公众号文章时抓包得到的 Cookie（get_article_details 必填）")]
    pub wechat_cookie: Option<String>,
    #[schemars(description = "公众号文章链接（get_article_details 必填）")]
    pub article_url: Option<String>,
}

/// 支持的动作
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    GetArticleUrls,
    GetArticleDetails,
}

impl Action {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "get_article_urls" => Some(Self::GetArticleUrls),
            "get_article_details" => Some(Self::GetArticleDetails),
            _ => None,
        }
    }
}

/// 动作分发器：校验参数、路由到对应动作、把网关结果整形成输出消息。
/// 一次调用产生一条 JSON 消息，或每条违规一条文本消息。
pub struct ActionDispatcher<G> {
    gateway: G,
}

impl<G: ArticleGateway> ActionDispatcher<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub async fn invoke(&self, req: InvocationRequest) -> Vec<OutputMessage> {
        let mut out = Vec::new();

        // 1. action 缺失/未知时立即返回，不再看其它参数
        let action_raw = req.action.as_deref().unwrap_or("");
        if action_raw.is_empty() {
            out.push(OutputMessage::text("Missing required parameter: action"));
            return out;
        }
        let Some(action) = Action::parse(action_raw) else {
            out.push(OutputMessage::text(format!(
                "Invalid action: {action_raw}. \
                 Supported actions are get_article_urls and get_article_details"
            )));
            return out;
        };

        // 2. 通用参数批量校验，全部通过才会发起网络调用
        let common = match validate_common(&req) {
            Ok(common) => common,
            Err(violations) => {
                tracing::warn!(action = action_raw, violations = violations.len(), "invocation rejected");
                out.extend(violations.into_iter().map(OutputMessage::Text));
                return out;
            }
        };

        tracing::info!(action = action_raw, nickname = common.nickname.as_str(), "dispatching");

        match action {
            Action::GetArticleUrls => {
                let creds = PlatformCredentials {
                    cookie: common.cookie,
                    token: common.token,
                };
                let query = UrlListQuery {
                    nickname: common.nickname,
                    biz: common.biz,
                    begin: common.begin,
                    count: common.count,
                };
                match self.gateway.article_urls(&creds, &query).await {
                    Ok(articles) => out.push(json_message(&ArticleUrlsResult::from(articles))),
                    Err(e) => {
                        tracing::error!("article listing failed: {e}");
                        out.push(OutputMessage::Text(render_error(&e)));
                    }
                }
            }
            Action::GetArticleDetails => {
                // 3. 动作专属参数同样批量校验
                let details = match validate_details(&req) {
                    Ok(details) => details,
                    Err(violations) => {
                        tracing::warn!(violations = violations.len(), "details invocation rejected");
                        out.extend(violations.into_iter().map(OutputMessage::Text));
                        return out;
                    }
                };
                let creds = ReadCredentials {
                    appmsg_token: details.appmsg_token,
                    cookie: details.wechat_cookie,
                };
                match self.fetch_details(&creds, &details.article_url).await {
                    Ok(payload) => out.push(json_message(&payload)),
                    Err(e) => {
                        tracing::error!("article details failed: {e}");
                        out.push(OutputMessage::Text(render_error(&e)));
                    }
                }
            }
        }

        out
    }

    /// 评论和阅读/点赞数两步拉取；任一步失败整次调用只回错误文本
    async fn fetch_details(
        &self,
        creds: &ReadCredentials,
        article_url: &str,
    ) -> Result<ArticleDetailsResult, GatewayError> {
        let comments = self.gateway.article_comments(creds, article_url).await?;
        let (read_num, like_num, old_like_num) =
            self.gateway.read_like_nums(creds, article_url).await?;
        Ok(ArticleDetailsResult {
            comments,
            read_num,
            like_num,
            old_like_num,
        })
    }
}

// ── 参数校验 ──

struct CommonParams {
    cookie: String,
    token: String,
    nickname: String,
    biz: String,
    begin: i64,
    count: i64,
}

struct DetailsParams {
    appmsg_token: String,
    wechat_cookie: String,
    article_url: String,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// count：缺省 5，必须是 1..=5 的整数
fn count_value(raw: Option<&Value>) -> Result<i64, String> {
    let Some(raw) = raw else { return Ok(5) };
    raw.as_i64()
        .filter(|n| (1..=5).contains(n))
        .ok_or_else(|| "Parameter 'count' must be an integer between 1 and 5".to_string())
}

/// begin：缺省 0，必须是非负整数
fn begin_value(raw: Option<&Value>) -> Result<i64, String> {
    let Some(raw) = raw else { return Ok(0) };
    raw.as_i64()
        .filter(|n| *n >= 0)
        .ok_or_else(|| "Parameter 'begin' must be a non-negative integer".to_string())
}

fn validate_common(req: &InvocationRequest) -> Result<CommonParams, Vec<String>> {
    let mut violations = Vec::new();

    let required = [
        (
            &req.cookie,
            "cookie",
            "Cookie obtained from the WeChat official account platform",
        ),
        (
            &req.token,
            "token",
            "Token obtained from the WeChat official account platform",
        ),
        (
            &req.nickname,
            "nickname",
            "Nickname of the WeChat official account",
        ),
        (
            &req.biz,
            "biz",
            "Biz identifier of the WeChat official account",
        ),
    ];
    for (value, name, description) in required {
        if !present(value) {
            violations.push(format!("Missing required parameter: {name}. {description}"));
        }
    }

    let count = match count_value(req.count.as_ref()) {
        Ok(count) => count,
        Err(msg) => {
            violations.push(msg);
            0
        }
    };
    let begin = match begin_value(req.begin.as_ref()) {
        Ok(begin) => begin,
        Err(msg) => {
            violations.push(msg);
            0
        }
    };

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(CommonParams {
        cookie: req.cookie.clone().unwrap_or_default(),
        token: req.token.clone().unwrap_or_default(),
        nickname: req.nickname.clone().unwrap_or_default(),
        biz: req.biz.clone().unwrap_or_default(),
        begin,
        count,
    })
}

fn validate_details(req: &InvocationRequest) -> Result<DetailsParams, Vec<String>> {
    let mut violations = Vec::new();

    let required = [
        (
            &req.appmsg_token,
            "appmsg_token",
            "Appmsg_token obtained by capturing packets when opening WeChat official account articles",
        ),
        (
            &req.wechat_cookie,
            "wechat_cookie",
            "Cookie obtained by capturing packets when opening WeChat official account articles",
        ),
        (
            &req.article_url,
            "article_url",
            "URL of the WeChat official account article",
        ),
    ];
    for (value, name, description) in required {
        if !present(value) {
            violations.push(format!(
                "Missing required parameter for get_article_details: {name}. {description}"
            ));
        }
    }

    if let Some(article_url) = req.article_url.as_deref() {
        if !article_url.is_empty() && !article_url.starts_with("http") {
            violations.push("Parameter 'article_url' must be a valid URL".to_string());
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(DetailsParams {
        appmsg_token: req.appmsg_token.clone().unwrap_or_default(),
        wechat_cookie: req.wechat_cookie.clone().unwrap_or_default(),
        article_url: req.article_url.clone().unwrap_or_default(),
    })
}

// ── 输出整形 ──

fn json_message<T: Serialize>(payload: &T) -> OutputMessage {
    match serde_json::to_value(payload) {
        Ok(value) => OutputMessage::json(value),
        Err(e) => OutputMessage::text(format!("An error occurred while invoking the tool: {e}")),
    }
}

/// 错误分类到用户可读文案的映射
fn render_error(err: &GatewayError) -> String {
    match err {
        GatewayError::Network(detail) => format!("Network error occurred: {detail}"),
        GatewayError::Value(detail) => format!("Invalid parameter value: {detail}"),
        GatewayError::Unexpected(detail) => {
            format!("An error occurred while invoking the tool: {detail}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArticleSummary;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy)]
    enum FailKind {
        Network,
        Value,
        Unexpected,
    }

    #[derive(Default)]
    struct MockGateway {
        articles: Vec<ArticleSummary>,
        comments: Vec<Value>,
        nums: (i64, i64, i64),
        fail: Option<FailKind>,
        calls: Arc<AtomicUsize>,
        last_query: Arc<Mutex<Option<UrlListQuery>>>,
    }

    impl MockGateway {
        fn failing(kind: FailKind) -> Self {
            Self {
                fail: Some(kind),
                ..Default::default()
            }
        }

        fn error(&self) -> Option<GatewayError> {
            self.fail.map(|kind| match kind {
                FailKind::Network => GatewayError::Network("connection reset by peer".to_string()),
                FailKind::Value => GatewayError::Value("invalid digit found in string".to_string()),
                FailKind::Unexpected => {
                    GatewayError::Unexpected("response missing appmsgstat".to_string())
                }
            })
        }
    }

    #[async_trait::async_trait]
    impl ArticleGateway for MockGateway {
        async fn article_urls(
            &self,
            _creds: &PlatformCredentials,
            query: &UrlListQuery,
        ) -> Result<Vec<ArticleSummary>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some(query.clone());
            match self.error() {
                Some(e) => Err(e),
                None => Ok(self.articles.clone()),
            }
        }

        async fn article_comments(
            &self,
            _creds: &ReadCredentials,
            _article_url: &str,
        ) -> Result<Vec<Value>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.error() {
                Some(e) => Err(e),
                None => Ok(self.comments.clone()),
            }
        }

        async fn read_like_nums(
            &self,
            _creds: &ReadCredentials,
            _article_url: &str,
        ) -> Result<(i64, i64, i64), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.error() {
                Some(e) => Err(e),
                None => Ok(self.nums),
            }
        }
    }

    fn urls_request() -> InvocationRequest {
        InvocationRequest {
            action: Some("get_article_urls".to_string()),
            cookie: Some("platform-cookie".to_string()),
            token: Some("1234567890".to_string()),
            nickname: Some("测试公众号".to_string()),
            biz: Some("MzA5MTE3OTc2Ng==".to_string()),
            ..Default::default()
        }
    }

    fn details_request() -> InvocationRequest {
        InvocationRequest {
            action: Some("get_article_details".to_string()),
            appmsg_token: Some("appmsg-token".to_string()),
            wechat_cookie: Some("reader-cookie".to_string()),
            article_url: Some(
                "https://mp.weixin.qq.com/s?__biz=MzA5MTE3OTc2Ng==&mid=1&idx=1&sn=2".to_string(),
            ),
            ..urls_request()
        }
    }

    fn only_text(out: &[OutputMessage]) -> Vec<&str> {
        out.iter()
            .map(|m| match m {
                OutputMessage::Text(t) => t.as_str(),
                OutputMessage::Json(_) => panic!("expected text message, got JSON"),
            })
            .collect()
    }

    #[tokio::test]
    async fn missing_action_is_the_only_output() {
        let dispatcher = ActionDispatcher::new(MockGateway::default());
        let out = dispatcher.invoke(InvocationRequest::default()).await;
        assert_eq!(
            out,
            vec![OutputMessage::text("Missing required parameter: action")]
        );
    }

    #[tokio::test]
    async fn empty_action_counts_as_missing() {
        let dispatcher = ActionDispatcher::new(MockGateway::default());
        let req = InvocationRequest {
            action: Some(String::new()),
            ..Default::default()
        };
        let out = dispatcher.invoke(req).await;
        assert_eq!(
            out,
            vec![OutputMessage::text("Missing required parameter: action")]
        );
    }

    #[tokio::test]
    async fn unknown_action_lists_supported_ones() {
        let dispatcher = ActionDispatcher::new(MockGateway::default());
        let req = InvocationRequest {
            action: Some("bogus".to_string()),
            ..Default::default()
        };
        let out = dispatcher.invoke(req).await;
        let texts = only_text(&out);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Invalid action: bogus"));
        assert!(texts[0].contains("get_article_urls"));
        assert!(texts[0].contains("get_article_details"));
    }

    #[tokio::test]
    async fn missing_common_parameters_are_batched_without_network() {
        let gateway = MockGateway::default();
        let calls = gateway.calls.clone();
        let dispatcher = ActionDispatcher::new(gateway);

        let mut req = urls_request();
        req.biz = None;
        req.nickname = Some(String::new());
        let out = dispatcher.invoke(req).await;

        let texts = only_text(&out);
        assert_eq!(texts.len(), 2);
        assert!(texts
            .iter()
            .any(|t| t.contains("Missing required parameter: nickname")));
        assert!(texts
            .iter()
            .any(|t| t.contains("Missing required parameter: biz")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn count_out_of_range_is_rejected_without_network() {
        let gateway = MockGateway::default();
        let calls = gateway.calls.clone();
        let dispatcher = ActionDispatcher::new(gateway);

        let mut req = urls_request();
        req.count = Some(json!(6));
        let out = dispatcher.invoke(req).await;

        let texts = only_text(&out);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("must be an integer between 1 and 5"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn count_of_wrong_type_is_rejected() {
        let dispatcher = ActionDispatcher::new(MockGateway::default());
        let mut req = urls_request();
        req.count = Some(json!("3"));
        let out = dispatcher.invoke(req).await;
        assert!(only_text(&out)[0].contains("must be an integer between 1 and 5"));
    }

    #[tokio::test]
    async fn negative_begin_is_rejected() {
        let dispatcher = ActionDispatcher::new(MockGateway::default());
        let mut req = urls_request();
        req.begin = Some(json!(-1));
        let out = dispatcher.invoke(req).await;
        assert!(only_text(&out)[0].contains("Parameter 'begin' must be a non-negative integer"));
    }

    #[tokio::test]
    async fn listing_defaults_are_forwarded() {
        let gateway = MockGateway::default();
        let last_query = gateway.last_query.clone();
        let dispatcher = ActionDispatcher::new(gateway);

        dispatcher.invoke(urls_request()).await;

        let query = last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query.begin, 0);
        assert_eq!(query.count, 5);
        assert_eq!(query.biz, "MzA5MTE3OTc2Ng==");
    }

    #[tokio::test]
    async fn listing_result_has_fixed_shape() {
        let gateway = MockGateway {
            articles: vec![ArticleSummary {
                title: "A".to_string(),
                link: "http://x".to_string(),
                update_time: 100,
                cover: "c".to_string(),
            }],
            ..Default::default()
        };
        let dispatcher = ActionDispatcher::new(gateway);

        let out = dispatcher.invoke(urls_request()).await;
        assert_eq!(
            out,
            vec![OutputMessage::Json(json!({
                "articles": [
                    {"title": "A", "link": "http://x", "update_time": 100, "cover": "c"}
                ],
                "total_count": 1
            }))]
        );
    }

    #[tokio::test]
    async fn details_missing_parameters_are_batched_without_network() {
        let gateway = MockGateway::default();
        let calls = gateway.calls.clone();
        let dispatcher = ActionDispatcher::new(gateway);

        let mut req = details_request();
        req.appmsg_token = None;
        req.article_url = None;
        let out = dispatcher.invoke(req).await;

        let texts = only_text(&out);
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().all(|t| t
            .starts_with("Missing required parameter for get_article_details:")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn details_url_scheme_is_checked() {
        let gateway = MockGateway::default();
        let calls = gateway.calls.clone();
        let dispatcher = ActionDispatcher::new(gateway);

        let mut req = details_request();
        req.article_url = Some("ftp://mp.weixin.qq.com/s?__biz=x".to_string());
        let out = dispatcher.invoke(req).await;

        let texts = only_text(&out);
        assert_eq!(texts, vec!["Parameter 'article_url' must be a valid URL"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn details_result_has_fixed_shape() {
        let gateway = MockGateway {
            comments: vec![json!("hi")],
            nums: (10, 2, 1),
            ..Default::default()
        };
        let dispatcher = ActionDispatcher::new(gateway);

        let out = dispatcher.invoke(details_request()).await;
        assert_eq!(
            out,
            vec![OutputMessage::Json(json!({
                "comments": ["hi"],
                "read_num": 10,
                "like_num": 2,
                "old_like_num": 1
            }))]
        );
    }

    #[tokio::test]
    async fn network_error_yields_single_prefixed_text() {
        let dispatcher = ActionDispatcher::new(MockGateway::failing(FailKind::Network));
        let out = dispatcher.invoke(urls_request()).await;
        let texts = only_text(&out);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Network error occurred: "));
    }

    #[tokio::test]
    async fn network_error_in_details_branch_is_prefixed_too() {
        let dispatcher = ActionDispatcher::new(MockGateway::failing(FailKind::Network));
        let out = dispatcher.invoke(details_request()).await;
        let texts = only_text(&out);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Network error occurred: "));
    }

    #[tokio::test]
    async fn value_error_is_prefixed() {
        let dispatcher = ActionDispatcher::new(MockGateway::failing(FailKind::Value));
        let out = dispatcher.invoke(details_request()).await;
        assert!(only_text(&out)[0].starts_with("Invalid parameter value: "));
    }

    #[tokio::test]
    async fn unexpected_error_is_prefixed() {
        let dispatcher = ActionDispatcher::new(MockGateway::failing(FailKind::Unexpected));
        let out = dispatcher.invoke(urls_request()).await;
        assert!(only_text(&out)[0].starts_with("An error occurred while invoking the tool: "));
    }
}
