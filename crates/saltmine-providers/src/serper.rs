use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use saltmine_types::models::{CombinedSearch, Platform, SearchPost, SearchResult};

use crate::error::ProviderError;

pub const DEFAULT_API_URL: &str = "https://google.serper.dev/search";

/// Serper caps a single page at 100 results.
const MAX_RESULTS: u32 = 100;

#[derive(Debug, Clone)]
pub struct SerperConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for SerperConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub num: u32,
    pub page: u32,
    /// Country code.
    pub gl: String,
    /// Interface language.
    pub hl: String,
    /// Time range filter, e.g. `qdr:w`.
    pub tbs: Option<String>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            num: 25,
            page: 1,
            gl: "us".to_string(),
            hl: "en".to_string(),
            tbs: None,
        }
    }

    pub fn num(mut self, num: u32) -> Self {
        self.num = num;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn tbs(mut self, tbs: Option<String>) -> Self {
        self.tbs = tbs.filter(|t| !t.trim().is_empty());
        self
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Searches `params.query` restricted to `platform`'s sites.
    async fn search(&self, platform: Platform, params: &SearchParams) -> Result<SearchResult, ProviderError>;

    /// Searches inside a single subreddit. A leading `r/` is ignored.
    async fn search_subreddit(
        &self,
        subreddit: &str,
        query: Option<&str>,
        num: u32,
        tbs: Option<String>,
    ) -> Result<SearchResult, ProviderError> {
        let name = subreddit.trim();
        let name = name.strip_prefix("r/").unwrap_or(name).trim();
        if name.is_empty() {
            return Err(ProviderError::Validation("Subreddit name is required".into()));
        }

        let scoped = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => format!("site:reddit.com/r/{} {}", name, q),
            None => format!("site:reddit.com/r/{}", name),
        };
        self.search(Platform::Reddit, &SearchParams::new(scoped).num(num).tbs(tbs))
            .await
    }
}

/// Searches Reddit and X concurrently. A failing platform contributes an
/// empty list; this never returns an error.
pub async fn search_both(provider: &dyn SearchProvider, query: &str, num: u32) -> CombinedSearch {
    let started = Instant::now();
    let params = SearchParams::new(query).num(num);

    let (reddit, x) = tokio::join!(
        provider.search(Platform::Reddit, &params),
        provider.search(Platform::X, &params),
    );

    let reddit_posts = posts_or_empty(Platform::Reddit, reddit);
    let x_posts = posts_or_empty(Platform::X, x);

    let combined = CombinedSearch::new(reddit_posts, x_posts, started.elapsed().as_secs_f64());
    info!(
        reddit = combined.reddit_posts.len(),
        x = combined.x_posts.len(),
        "Combined search finished"
    );
    combined
}

fn posts_or_empty(platform: Platform, result: Result<SearchResult, ProviderError>) -> Vec<SearchPost> {
    match result {
        Ok(r) => r.posts,
        Err(e) => {
            warn!(%platform, "Search failed, continuing without it: {}", e);
            Vec::new()
        }
    }
}

#[derive(Clone)]
pub struct SerperClient {
    http: Client,
    config: SerperConfig,
}

impl SerperClient {
    pub fn new(config: SerperConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
    page: u32,
    gl: &'a str,
    hl: &'a str,
    autocorrect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
    search_information: Option<SearchInformation>,
}

#[derive(Debug, Default, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    date: Option<String>,
    position: Option<u32>,
    domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    total_results: Option<Value>,
    time_taken: Option<f64>,
}

#[async_trait]
impl SearchProvider for SerperClient {
    #[instrument(skip(self, params))]
    async fn search(&self, platform: Platform, params: &SearchParams) -> Result<SearchResult, ProviderError> {
        let query = params.query.trim();
        if query.is_empty() {
            return Err(ProviderError::Validation("Search query is required".into()));
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("SERPER_API_KEY"))?;

        let scoped = build_query(platform, query);
        let body = SerperRequest {
            q: &scoped,
            num: params.num.min(MAX_RESULTS),
            page: params.page,
            gl: &params.gl,
            hl: &params.hl,
            autocorrect: true,
            tbs: params.tbs.as_deref(),
        };
        debug!(query = %scoped, num = body.num, page = body.page, "Sending Serper request");

        let response = self
            .http
            .post(&self.config.api_url)
            .header("X-API-KEY", api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_send)?;

        if !response.status().is_success() {
            let err = ProviderError::from_response(response).await;
            if let ProviderError::Http { status, body } = &err {
                error!(status, body = %body, "Serper API error");
            }
            return Err(err);
        }

        let data: SerperResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Decode(e.to_string())
            }
        })?;

        let posts = parse_organic(platform, data.organic);
        let info = data.search_information.unwrap_or_default();
        debug!(posts = posts.len(), "Serper response parsed");

        Ok(SearchResult {
            posts,
            total: parse_total(info.total_results.as_ref()),
            search_time: info.time_taken.unwrap_or(0.0),
            query: params.query.clone(),
            platform,
        })
    }
}

/// Subreddit queries arrive already scoped and are passed through as-is.
fn build_query(platform: Platform, query: &str) -> String {
    if platform == Platform::Reddit && query.starts_with("site:reddit.com/r/") {
        query.to_string()
    } else {
        platform.scope_query(query)
    }
}

fn parse_organic(platform: Platform, organic: Vec<OrganicResult>) -> Vec<SearchPost> {
    organic
        .into_iter()
        .enumerate()
        .filter_map(|(index, result)| {
            let link = result.link.filter(|l| !l.is_empty())?;
            let subreddit = match platform {
                Platform::Reddit => subreddit_from_link(&link),
                Platform::X => None,
            };
            Some(SearchPost {
                title: result
                    .title
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string()),
                snippet: result.snippet.unwrap_or_default(),
                date: result.date,
                subreddit,
                platform,
                position: result.position.unwrap_or(index as u32 + 1),
                domain: result
                    .domain
                    .unwrap_or_else(|| platform.default_domain().to_string()),
                link,
            })
        })
        .collect()
}

fn subreddit_from_link(link: &str) -> Option<String> {
    let rest = &link[link.find("reddit.com/r/")? + "reddit.com/r/".len()..];
    let name = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}

/// `totalResults` comes back as a string with thousands separators.
fn parse_total(raw: Option<&Value>) -> u64 {
    match raw {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.replace(',', "").trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn organic(v: Value) -> Vec<OrganicResult> {
        serde_json::from_value::<SerperResponse>(v).unwrap().organic
    }

    #[test]
    fn organic_results_are_normalized() {
        let data = organic(json!({
            "organic": [
                {"title": "Notion is slow", "link": "https://www.reddit.com/r/Notion/comments/abc/slow/", "snippet": "so slow", "position": 1},
                {"snippet": "no link here"},
                {"link": "https://reddit.com/r/productivity?x=1"},
            ]
        }));
        let posts = parse_organic(Platform::Reddit, data);

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].subreddit.as_deref(), Some("Notion"));
        assert_eq!(posts[0].domain, "reddit.com");
        assert_eq!(posts[1].title, "Untitled");
        assert_eq!(posts[1].subreddit.as_deref(), Some("productivity"));
        // Position falls back to the index in the raw list
        assert_eq!(posts[1].position, 3);
    }

    #[test]
    fn x_posts_have_no_subreddit() {
        let posts = parse_organic(
            Platform::X,
            organic(json!({"organic": [{"title": "t", "link": "https://x.com/a/status/1"}]})),
        );
        assert_eq!(posts[0].subreddit, None);
        assert_eq!(posts[0].domain, "x.com");
        assert_eq!(posts[0].platform, Platform::X);
    }

    #[test]
    fn total_results_strip_separators() {
        assert_eq!(parse_total(Some(&json!("1,234,567"))), 1_234_567);
        assert_eq!(parse_total(Some(&json!(42))), 42);
        assert_eq!(parse_total(Some(&json!("about"))), 0);
        assert_eq!(parse_total(None), 0);
    }

    #[test]
    fn subreddit_queries_are_not_rescoped() {
        assert_eq!(
            build_query(Platform::Reddit, "site:reddit.com/r/rust async"),
            "site:reddit.com/r/rust async"
        );
        assert_eq!(build_query(Platform::Reddit, "notion"), "site:reddit.com notion");
    }

    /// Records every query and fails for the platforms listed in `failing`.
    struct FakeSearch {
        failing: Vec<Platform>,
        seen: Mutex<Vec<(Platform, String)>>,
    }

    impl FakeSearch {
        fn new(failing: Vec<Platform>) -> Self {
            Self {
                failing,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn search(&self, platform: Platform, params: &SearchParams) -> Result<SearchResult, ProviderError> {
            self.seen.lock().unwrap().push((platform, params.query.clone()));
            if self.failing.contains(&platform) {
                return Err(ProviderError::Timeout);
            }
            let posts = (0..params.num.min(3))
                .map(|i| SearchPost {
                    title: format!("post {}", i),
                    link: format!("https://{}/{}", platform.default_domain(), i),
                    snippet: String::new(),
                    date: None,
                    subreddit: None,
                    platform,
                    position: i + 1,
                    domain: platform.default_domain().to_string(),
                })
                .collect();
            Ok(SearchResult {
                posts,
                total: 100,
                search_time: 0.1,
                query: params.query.clone(),
                platform,
            })
        }
    }

    #[tokio::test]
    async fn search_both_tolerates_partial_failure() {
        let provider = FakeSearch::new(vec![Platform::X]);
        let combined = search_both(&provider, "notion", 20).await;

        assert_eq!(combined.reddit_posts.len(), 3);
        assert!(combined.x_posts.is_empty());
        assert_eq!(combined.total, 3);
    }

    #[tokio::test]
    async fn search_both_total_failure_is_empty_not_error() {
        let provider = FakeSearch::new(vec![Platform::Reddit, Platform::X]);
        let combined = search_both(&provider, "notion", 20).await;
        assert!(combined.is_empty());
        assert_eq!(combined.total, 0);
    }

    #[tokio::test]
    async fn subreddit_search_strips_prefix() {
        let provider = FakeSearch::new(vec![]);
        provider
            .search_subreddit("r/rust ", Some(" async "), 5, None)
            .await
            .unwrap();
        provider.search_subreddit("rust", None, 5, None).await.unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].1, "site:reddit.com/r/rust async");
        assert_eq!(seen[1].1, "site:reddit.com/r/rust");

        drop(seen);
        let err = provider.search_subreddit("r/", None, 5, None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let client = SerperClient::new(SerperConfig::default());
        let err = client
            .search(Platform::Reddit, &SearchParams::new("notion"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured("SERPER_API_KEY")));

        let err = client
            .search(Platform::Reddit, &SearchParams::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
