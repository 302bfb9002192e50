use anyhow::{Context, Result};
use futures::prelude::*;
use std::{collections::BTreeSet, pin::Pin, str::FromStr, time::Duration};

/// Models per-service route and retry policy discovery.
#[async_trait::async_trait]
pub trait DiscoverProfile<T> {
    async fn watch_profile(&self, target: T) -> Result<Option<ProfileStream>>;
}

/// `None` means no `ServiceProfile` currently resolves for the target; the
/// profile translator substitutes the empty-but-valid default for it.
pub type ProfileStream = Pin<Box<dyn Stream<Item = Option<Profile>> + Send + Sync + 'static>>;

/// A fully merged view of a service's routing policy: the `ServiceProfile`'s
/// own routes/retries/overrides, plus whatever opaque-ports adaptor or
/// fallback composition produced this particular value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub fully_qualified_name: String,
    pub routes: Vec<RouteSpec>,
    pub retry_budget: Option<RetryBudget>,
    pub opaque_ports: BTreeSet<u16>,
    pub dst_overrides: Vec<WeightedDst>,
}

impl Profile {
    /// The empty-but-valid profile emitted when no upstream source has ever
    /// reported a real profile for the target.
    pub fn empty(fully_qualified_name: impl Into<String>) -> Self {
        Self {
            fully_qualified_name: fully_qualified_name.into(),
            ..Self::default()
        }
    }
}

/// A single `ServiceProfile` route: a request-match condition paired with
/// the retry/timeout metadata that applies when it matches.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteSpec {
    pub name: String,
    pub condition: RequestMatch,
    pub response_classes: Vec<ResponseClass>,
    pub is_retryable: bool,
    pub timeout: Option<Duration>,
}

/// A (possibly nested) request-match condition, mirroring the
/// `ServiceProfile` CRD's `RequestMatch`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestMatch {
    pub path: Option<PathMatch>,
    pub method: Option<HttpMethod>,
    pub all: Vec<RequestMatch>,
    pub any: Vec<RequestMatch>,
    pub not: Option<Box<RequestMatch>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathMatch {
    Regex(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
    Unregistered(String),
}

impl FromStr for HttpMethod {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Unregistered(other.to_string()),
        })
    }
}

/// A response classification rule: requests whose response matches
/// `condition` are counted as failures (for retry budgeting) when
/// `is_failure` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseClass {
    pub condition: ResponseMatch,
    pub is_failure: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseMatch {
    pub status: Option<StatusRange>,
    pub all: Vec<ResponseMatch>,
    pub any: Vec<ResponseMatch>,
    pub not: Option<Box<ResponseMatch>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl FromStr for StatusRange {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.split('-');
        let min = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("status range must be non-empty"))?
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid status range minimum in {s:?}"))?;
        let max = parts
            .next()
            .map(|max| {
                max.trim()
                    .parse::<u16>()
                    .with_context(|| format!("invalid status range maximum in {s:?}"))
            })
            .transpose()?
            .unwrap_or(min);
        Ok(Self { min, max })
    }
}

/// The retry budget a proxy should enforce when retrying requests matched by
/// a retryable route.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RetryBudget {
    pub retry_ratio: f32,
    pub min_retries_per_second: u32,
    pub ttl: Duration,
}

/// One leaf of a traffic split: an alternate authority and the share of
/// traffic it should receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedDst {
    pub authority: String,
    pub weight: u32,
}
