use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header;
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;
use crate::model::ArticleSummary;

const PLATFORM_BASE: &str = "https://mp.weixin.qq.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 公众平台网页版凭证
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformCredentials {
    pub cookie: String,
    pub token: String,
}

/// 抓包得到的阅读端会话凭证
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCredentials {
    pub appmsg_token: String,
    pub cookie: String,
}

/// 文章列表查询参数
#[derive(Debug, Clone, PartialEq)]
pub struct UrlListQuery {
    pub nickname: String,
    pub biz: String,
    pub begin: i64,
    pub count: i64,
}

/// 微信数据网关。dispatcher 只依赖该接口，测试用 mock 实现替换。
#[async_trait]
pub trait ArticleGateway: Send + Sync {
    /// 列出公众号最近发布的文章
    async fn article_urls(
        &self,
        creds: &PlatformCredentials,
        query: &UrlListQuery,
    ) -> Result<Vec<ArticleSummary>, GatewayError>;

    /// 拉取单篇文章的精选评论，记录原样透传
    async fn article_comments(
        &self,
        creds: &ReadCredentials,
        article_url: &str,
    ) -> Result<Vec<Value>, GatewayError>;

    /// 拉取单篇文章的 (read_num, like_num, old_like_num)
    async fn read_like_nums(
        &self,
        creds: &ReadCredentials,
        article_url: &str,
    ) -> Result<(i64, i64, i64), GatewayError>;
}

/// 真实 HTTP 网关。会话对象按调用构造，连接池在调用间共享。
pub struct HttpGateway {
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ArticleGateway for HttpGateway {
    async fn article_urls(
        &self,
        creds: &PlatformCredentials,
        query: &UrlListQuery,
    ) -> Result<Vec<ArticleSummary>, GatewayError> {
        PublicAccountSession::new(&self.http, &creds.cookie, &creds.token)
            .article_urls(&query.nickname, &query.biz, query.begin, query.count)
            .await
    }

    async fn article_comments(
        &self,
        creds: &ReadCredentials,
        article_url: &str,
    ) -> Result<Vec<Value>, GatewayError> {
        ArticleReader::new(&self.http, &creds.appmsg_token, &creds.cookie)
            .comments(article_url)
            .await
    }

    async fn read_like_nums(
        &self,
        creds: &ReadCredentials,
        article_url: &str,
    ) -> Result<(i64, i64, i64), GatewayError> {
        ArticleReader::new(&self.http, &creds.appmsg_token, &creds.cookie)
            .read_like_nums(article_url)
            .await
    }
}

// ── 公众平台会话 ──

/// 公众平台网页版会话，对应列表接口
struct PublicAccountSession<'a> {
    http: &'a reqwest::Client,
    cookie: &'a str,
    token: &'a str,
}

impl<'a> PublicAccountSession<'a> {
    fn new(http: &'a reqwest::Client, cookie: &'a str, token: &'a str) -> Self {
        Self {
            http,
            cookie,
            token,
        }
    }

    /// 用昵称在平台内检索 fakeid，检索不到时由调用方回退到 biz
    async fn resolve_fakeid(&self, nickname: &str) -> Result<Option<String>, GatewayError> {
        let body = get_json(
            self.http,
            self.cookie,
            &format!("{PLATFORM_BASE}/cgi-bin/searchbiz"),
            &[
                ("action", "search_biz"),
                ("query", nickname),
                ("begin", "0"),
                ("count", "5"),
                ("token", self.token),
                ("lang", "zh_CN"),
                ("f", "json"),
                ("ajax", "1"),
            ],
        )
        .await?;

        Ok(parse_fakeid(&body))
    }

    async fn article_urls(
        &self,
        nickname: &str,
        biz: &str,
        begin: i64,
        count: i64,
    ) -> Result<Vec<ArticleSummary>, GatewayError> {
        let fakeid = self
            .resolve_fakeid(nickname)
            .await?
            .unwrap_or_else(|| biz.to_string());

        // 接口按字符串接收分页参数
        let begin = begin.to_string();
        let count = count.to_string();

        let body = get_json(
            self.http,
            self.cookie,
            &format!("{PLATFORM_BASE}/cgi-bin/appmsg"),
            &[
                ("action", "list_ex"),
                ("begin", begin.as_str()),
                ("count", count.as_str()),
                ("fakeid", fakeid.as_str()),
                ("type", "9"),
                ("query", ""),
                ("token", self.token),
                ("lang", "zh_CN"),
                ("f", "json"),
                ("ajax", "1"),
            ],
        )
        .await?;

        parse_article_list(&body)
    }
}

// ── 文章阅读端会话 ──

/// 阅读端会话，对应评论与阅读/点赞接口
struct ArticleReader<'a> {
    http: &'a reqwest::Client,
    appmsg_token: &'a str,
    cookie: &'a str,
}

impl<'a> ArticleReader<'a> {
    fn new(http: &'a reqwest::Client, appmsg_token: &'a str, cookie: &'a str) -> Self {
        Self {
            http,
            appmsg_token,
            cookie,
        }
    }

    async fn comments(&self, article_url: &str) -> Result<Vec<Value>, GatewayError> {
        let key = ArticleKey::from_url(article_url)?;

        // comment_id 只能从文章页面里拿；页面没有该标记说明未开放评论区
        let html = self
            .http
            .get(article_url)
            .header(header::COOKIE, self.cookie)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .text()
            .await?;

        let Some(comment_id) = extract_comment_id(&html) else {
            return Ok(Vec::new());
        };

        let body = get_json(
            self.http,
            self.cookie,
            &format!("{PLATFORM_BASE}/mp/appmsg_comment"),
            &[
                ("action", "getcomment"),
                ("scene", "0"),
                ("__biz", key.biz.as_str()),
                ("appmsgid", key.mid.as_str()),
                ("idx", key.idx.as_str()),
                ("comment_id", comment_id.as_str()),
                ("offset", "0"),
                ("limit", "100"),
                ("appmsg_token", self.appmsg_token),
                ("f", "json"),
            ],
        )
        .await?;

        Ok(parse_comment_list(&body))
    }

    async fn read_like_nums(&self, article_url: &str) -> Result<(i64, i64, i64), GatewayError> {
        let key = ArticleKey::from_url(article_url)?;

        let text = self
            .http
            .post(format!("{PLATFORM_BASE}/mp/getappmsgext"))
            .query(&[
                ("appmsg_token", self.appmsg_token),
                ("x5", "0"),
                ("f", "json"),
            ])
            .header(header::COOKIE, self.cookie)
            .header(header::USER_AGENT, USER_AGENT)
            .form(&[
                ("is_only_read", "1"),
                ("is_temp_url", "0"),
                ("appmsg_type", "9"),
                ("__biz", key.biz.as_str()),
                ("mid", key.mid.as_str()),
                ("sn", key.sn.as_str()),
                ("idx", key.idx.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Value(format!("engagement response is not valid JSON: {e}")))?;

        parse_engagement(&body)
    }
}

/// 文章链接 query 里定位一篇文章的四元组
#[derive(Debug, PartialEq)]
struct ArticleKey {
    biz: String,
    mid: String,
    idx: String,
    sn: String,
}

impl ArticleKey {
    fn from_url(article_url: &str) -> Result<Self, GatewayError> {
        let parsed = Url::parse(article_url)
            .map_err(|e| GatewayError::Value(format!("article_url is not a valid URL: {e}")))?;

        let mut biz = None;
        let mut mid = None;
        let mut idx = None;
        let mut sn = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "__biz" => biz = Some(value.into_owned()),
                "mid" => mid = Some(value.into_owned()),
                "idx" => idx = Some(value.into_owned()),
                "sn" => sn = Some(value.into_owned()),
                _ => {}
            }
        }

        fn take(value: Option<String>, name: &str) -> Result<String, GatewayError> {
            value.filter(|v| !v.is_empty()).ok_or_else(|| {
                GatewayError::Value(format!("article_url missing query parameter {name}"))
            })
        }

        Ok(Self {
            biz: take(biz, "__biz")?,
            mid: take(mid, "mid")?,
            idx: take(idx, "idx")?,
            sn: take(sn, "sn")?,
        })
    }
}

// ── 预编译正则 ──

fn comment_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"comment_id\s*=\s*['"](\d+)['"]"#).unwrap())
}

/// 从文章页面 HTML 里提取 comment_id；"0" 同样表示没有评论区
fn extract_comment_id(html: &str) -> Option<String> {
    comment_id_regex()
        .captures(html)
        .map(|caps| caps[1].to_string())
        .filter(|id| id != "0")
}

// ── 响应解析 ──

async fn get_json(
    http: &reqwest::Client,
    cookie: &str,
    url: &str,
    params: &[(&str, &str)],
) -> Result<Value, GatewayError> {
    let text = http
        .get(url)
        .query(params)
        .header(header::COOKIE, cookie)
        .header(header::USER_AGENT, USER_AGENT)
        .send()
        .await?
        .text()
        .await?;

    serde_json::from_str(&text)
        .map_err(|e| GatewayError::Value(format!("response from {url} is not valid JSON: {e}")))
}

fn parse_fakeid(body: &Value) -> Option<String> {
    body["list"]
        .as_array()?
        .first()?
        .get("fakeid")?
        .as_str()
        .map(str::to_owned)
}

fn parse_article_list(body: &Value) -> Result<Vec<ArticleSummary>, GatewayError> {
    let ret = body["base_resp"]["ret"].as_i64().unwrap_or(0);
    if ret != 0 {
        let err_msg = body["base_resp"]["err_msg"].as_str().unwrap_or("unknown");
        return Err(GatewayError::Unexpected(format!(
            "platform api rejected the request: ret={ret} ({err_msg})"
        )));
    }

    let list = body
        .get("app_msg_list")
        .ok_or_else(|| GatewayError::Unexpected("response missing app_msg_list".to_string()))?;

    serde_json::from_value(list.clone())
        .map_err(|e| GatewayError::Value(format!("unexpected app_msg_list shape: {e}")))
}

fn parse_comment_list(body: &Value) -> Vec<Value> {
    body["elected_comment"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

fn parse_engagement(body: &Value) -> Result<(i64, i64, i64), GatewayError> {
    let stat = body.get("appmsgstat").ok_or_else(|| {
        GatewayError::Unexpected(
            "response missing appmsgstat (appmsg_token may have expired)".to_string(),
        )
    })?;

    Ok((
        stat["read_num"].as_i64().unwrap_or(0),
        stat["like_num"].as_i64().unwrap_or(0),
        stat["old_like_num"].as_i64().unwrap_or(0),
    ))
}
