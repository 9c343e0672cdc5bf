use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Membership level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Premium => "PREMIUM",
            Self::Enterprise => "ENTERPRISE",
        }
    }

    /// Paid tiers are never gated by the daily search quota.
    pub const fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(Self::Free),
            "PREMIUM" => Ok(Self::Premium),
            "ENTERPRISE" => Ok(Self::Enterprise),
            other => Err(format!("unknown membership type '{}'", other)),
        }
    }
}

/// Daily limits applied to a quota row when it is created or upgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub searches: i64,
    pub messages: i64,
}

impl QuotaLimits {
    /// Sentinel stored for tiers without a practical daily cap.
    pub const UNLIMITED: i64 = 999_999;

    pub const fn unlimited() -> Self {
        Self {
            searches: Self::UNLIMITED,
            messages: Self::UNLIMITED,
        }
    }
}

// -- Search --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    X,
}

impl Platform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reddit => "reddit",
            Self::X => "x",
        }
    }

    pub const fn default_domain(&self) -> &'static str {
        match self {
            Self::Reddit => "reddit.com",
            Self::X => "x.com",
        }
    }

    /// Restricts a free-text query to this platform's sites.
    pub fn scope_query(&self, query: &str) -> String {
        match self {
            Self::Reddit => format!("site:reddit.com {}", query.trim()),
            Self::X => format!("(site:twitter.com OR site:x.com) {}", query.trim()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search hit normalized across platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPost {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub date: Option<String>,
    pub subreddit: Option<String>,
    pub platform: Platform,
    pub position: u32,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub posts: Vec<SearchPost>,
    pub total: u64,
    pub search_time: f64,
    pub query: String,
    pub platform: Platform,
}

/// Result of searching both platforms at once. `total` always equals the
/// number of posts actually returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSearch {
    pub reddit_posts: Vec<SearchPost>,
    pub x_posts: Vec<SearchPost>,
    pub total: usize,
    pub search_time: f64,
}

impl CombinedSearch {
    pub fn new(reddit_posts: Vec<SearchPost>, x_posts: Vec<SearchPost>, search_time: f64) -> Self {
        let total = reddit_posts.len() + x_posts.len();
        Self {
            reddit_posts,
            x_posts,
            total,
            search_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

// -- Analysis --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub frustration_score: f64,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub opportunity: String,
    #[serde(default)]
    pub quote: Option<String>,
}
