//! `ServiceProfile` -> `linkerd_destination_core::Profile` conversion.

use linkerd_destination_core::{
    HttpMethod, PathMatch, Profile, RequestMatch, ResponseClass, ResponseMatch, RetryBudget,
    RouteSpec, StatusRange, WeightedDst,
};
use linkerd_destination_k8s_api::policy::serviceprofile;
use std::str::FromStr;

pub(crate) fn from_resource(fqn: String, spec: serviceprofile::ServiceProfileSpec) -> Profile {
    Profile {
        fully_qualified_name: fqn,
        routes: spec.routes.into_iter().map(route_spec).collect(),
        retry_budget: spec.retry_budget.map(retry_budget),
        opaque_ports: Default::default(),
        dst_overrides: spec.dst_overrides.into_iter().map(weighted_dst).collect(),
    }
}

fn route_spec(r: serviceprofile::RouteSpec) -> RouteSpec {
    RouteSpec {
        name: r.name,
        condition: request_match(r.condition),
        response_classes: r.response_classes.into_iter().map(response_class).collect(),
        is_retryable: r.is_retryable,
        timeout: r.timeout.map(|d| d.into()),
    }
}

fn request_match(m: serviceprofile::RequestMatch) -> RequestMatch {
    RequestMatch {
        path: m.path_regex.map(PathMatch::Regex),
        method: m.method.map(|s| HttpMethod::from_str(&s).expect("infallible")),
        all: m.all.into_iter().map(request_match).collect(),
        any: m.any.into_iter().map(request_match).collect(),
        not: m.not.map(|n| Box::new(request_match(*n))),
    }
}

fn response_class(c: serviceprofile::ResponseClass) -> ResponseClass {
    ResponseClass {
        condition: response_match(c.condition),
        is_failure: c.is_failure,
    }
}

fn response_match(m: serviceprofile::ResponseMatch) -> ResponseMatch {
    ResponseMatch {
        status: m.status.map(|s| StatusRange { min: s.min, max: s.max }),
        all: m.all.into_iter().map(response_match).collect(),
        any: m.any.into_iter().map(response_match).collect(),
        not: m.not.map(|n| Box::new(response_match(*n))),
    }
}

fn retry_budget(b: serviceprofile::RetryBudget) -> RetryBudget {
    RetryBudget {
        retry_ratio: b.retry_ratio,
        min_retries_per_second: b.min_retries_per_second,
        ttl: b.ttl.into(),
    }
}

fn weighted_dst(d: serviceprofile::WeightedDst) -> WeightedDst {
    WeightedDst {
        authority: d.authority,
        weight: d.weight,
    }
}
