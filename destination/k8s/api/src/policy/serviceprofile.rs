use crate::duration::K8sDuration;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes a service's per-route policy: retry eligibility, timeouts, and
/// traffic-split overrides, consumed by the profile translator.
#[derive(Clone, Debug, Default, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "linkerd.io",
    version = "v1alpha2",
    kind = "ServiceProfile",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProfileSpec {
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    pub retry_budget: Option<RetryBudget>,
    #[serde(default)]
    pub dst_overrides: Vec<WeightedDst>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub name: String,
    pub condition: RequestMatch,
    #[serde(default)]
    pub response_classes: Vec<ResponseClass>,
    #[serde(default)]
    pub is_retryable: bool,
    pub timeout: Option<K8sDuration>,
}

/// A (possibly nested) match over an outgoing request. Exactly the shape the
/// `ServiceProfile` CRD has always accepted: path-by-regex and method, ANDed
/// or ORed together, optionally negated.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatch {
    #[serde(rename = "pathRegex")]
    pub path_regex: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub all: Vec<RequestMatch>,
    #[serde(default)]
    pub any: Vec<RequestMatch>,
    pub not: Option<Box<RequestMatch>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseClass {
    pub condition: ResponseMatch,
    pub is_failure: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMatch {
    pub status: Option<StatusRange>,
    #[serde(default)]
    pub all: Vec<ResponseMatch>,
    #[serde(default)]
    pub any: Vec<ResponseMatch>,
    pub not: Option<Box<ResponseMatch>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryBudget {
    pub retry_ratio: f32,
    pub min_retries_per_second: u32,
    pub ttl: K8sDuration,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct WeightedDst {
    pub authority: String,
    pub weight: u32,
}
