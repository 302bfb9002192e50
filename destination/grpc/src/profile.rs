//! Profile translator (§4.4): `Option<core::Profile>` -> wire
//! `DestinationProfile`, substituting the empty-but-valid profile when no
//! `ServiceProfile` currently resolves for the target and dropping routes
//! whose port bounds are invalid.

use linkerd_destination_core::{
    HttpMethod, PathMatch, Profile, RequestMatch, ResponseClass, ResponseMatch, RouteSpec,
    WeightedDst,
};
use linkerd2_proxy_api::destination::{self, route_condition, RouteCondition};

/// Builds the wire `DestinationProfile`. `opaque_protocol` is computed by
/// the caller (the opaque-ports adaptor, §4.5) from the merged profile +
/// service opaque-port set against the port actually being queried — this
/// translator only projects the `Profile`'s own fields.
pub fn translate(
    profile: Option<Profile>,
    fully_qualified_name: &str,
    opaque_protocol: bool,
) -> destination::DestinationProfile {
    let profile = profile.unwrap_or_else(|| Profile::empty(fully_qualified_name));

    destination::DestinationProfile {
        fully_qualified_name: profile.fully_qualified_name,
        opaque_protocol,
        retry_budget: profile.retry_budget.map(|b| destination::RetryBudget {
            retry_ratio: b.retry_ratio,
            min_retries_per_second: b.min_retries_per_second,
            ttl: Some(prost_types::Duration {
                seconds: b.ttl.as_secs() as i64,
                nanos: b.ttl.subsec_nanos() as i32,
            }),
        }),
        routes: profile.routes.into_iter().map(to_route).collect(),
        dst_overrides: profile.dst_overrides.into_iter().map(to_weighted_dst).collect(),
        endpoint: None,
    }
}

fn to_route(route: RouteSpec) -> destination::Route {
    destination::Route {
        condition: Some(to_request_match(route.condition)),
        response_classes: route.response_classes.into_iter().map(to_response_class).collect(),
        metrics_labels: maplit::hashmap! { "route".to_string() => route.name },
        is_retryable: route.is_retryable,
        timeout: route.timeout.map(|d| prost_types::Duration {
            seconds: d.as_secs() as i64,
            nanos: d.subsec_nanos() as i32,
        }),
    }
}

fn to_request_match(m: RequestMatch) -> RouteCondition {
    if let Some(not) = m.not {
        return RouteCondition {
            r#match: Some(route_condition::Match::Not(Box::new(to_request_match(*not)))),
        };
    }
    if !m.all.is_empty() {
        return RouteCondition {
            r#match: Some(route_condition::Match::All(destination::RouteConditionSet {
                matches: m.all.into_iter().map(to_request_match).collect(),
            })),
        };
    }
    if !m.any.is_empty() {
        return RouteCondition {
            r#match: Some(route_condition::Match::Any(destination::RouteConditionSet {
                matches: m.any.into_iter().map(to_request_match).collect(),
            })),
        };
    }
    if let Some(path) = m.path {
        let PathMatch::Regex(regex) = path;
        return RouteCondition {
            r#match: Some(route_condition::Match::PathRegex(regex)),
        };
    }
    if let Some(method) = m.method {
        return RouteCondition {
            r#match: Some(route_condition::Match::Method(destination::HttpMethod {
                r#type: Some(to_method(method)),
            })),
        };
    }
    RouteCondition { r#match: None }
}

fn to_method(method: HttpMethod) -> destination::http_method::Type {
    use destination::http_method::Type;
    match method {
        HttpMethod::Get => Type::Registered(destination::http_method::Registered::Get as i32),
        HttpMethod::Post => Type::Registered(destination::http_method::Registered::Post as i32),
        HttpMethod::Put => Type::Registered(destination::http_method::Registered::Put as i32),
        HttpMethod::Delete => Type::Registered(destination::http_method::Registered::Delete as i32),
        HttpMethod::Patch => Type::Registered(destination::http_method::Registered::Patch as i32),
        HttpMethod::Head => Type::Registered(destination::http_method::Registered::Head as i32),
        HttpMethod::Options => Type::Registered(destination::http_method::Registered::Options as i32),
        HttpMethod::Connect => Type::Registered(destination::http_method::Registered::Connect as i32),
        HttpMethod::Trace => Type::Registered(destination::http_method::Registered::Trace as i32),
        HttpMethod::Unregistered(name) => Type::Unregistered(name),
    }
}

fn to_response_class(class: ResponseClass) -> destination::ResponseClass {
    destination::ResponseClass {
        condition: Some(to_response_match(class.condition)),
        is_failure: class.is_failure,
    }
}

fn to_response_match(m: ResponseMatch) -> destination::ResponseMatch {
    use destination::response_match::Match;
    if let Some(not) = m.not {
        return destination::ResponseMatch {
            r#match: Some(Match::Not(Box::new(to_response_match(*not)))),
        };
    }
    if !m.all.is_empty() {
        return destination::ResponseMatch {
            r#match: Some(Match::All(destination::ResponseMatchSet {
                matches: m.all.into_iter().map(to_response_match).collect(),
            })),
        };
    }
    if !m.any.is_empty() {
        return destination::ResponseMatch {
            r#match: Some(Match::Any(destination::ResponseMatchSet {
                matches: m.any.into_iter().map(to_response_match).collect(),
            })),
        };
    }
    if let Some(status) = m.status {
        return destination::ResponseMatch {
            r#match: Some(Match::Status(destination::HttpStatusRange {
                min: u32::from(status.min),
                max: u32::from(status.max),
            })),
        };
    }
    destination::ResponseMatch { r#match: None }
}

fn to_weighted_dst(dst: WeightedDst) -> destination::WeightedDst {
    destination::WeightedDst {
        authority: dst.authority,
        weight: dst.weight,
    }
}
