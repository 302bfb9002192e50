//! Parses the opaque `GetDestination.context_token` field, grounded on
//! `grpc/src/workload.rs`'s `Workload::from_str` (JSON-first, legacy
//! colon-form fallback, never fails the RPC).

use serde::Deserialize;

/// A parsed context token. Both fields are optional — an empty token is
/// always valid and simply carries no overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextToken {
    pub ns: Option<String>,
    pub node_name: Option<String>,
}

#[derive(Deserialize)]
struct Json {
    #[serde(default)]
    ns: Option<String>,
    #[serde(default, rename = "nodeName")]
    node_name: Option<String>,
}

/// Parses `token`, logging and degrading to an empty token on any
/// unrecognized shape rather than failing the call.
pub fn parse(token: &str) -> ContextToken {
    if token.is_empty() {
        return ContextToken::default();
    }

    if token.trim_start().starts_with('{') {
        return match serde_json::from_str::<Json>(token) {
            Ok(Json { ns, node_name }) => ContextToken { ns, node_name },
            Err(error) => {
                tracing::warn!(%error, "failed to parse context token as JSON");
                ContextToken::default()
            }
        };
    }

    if let Some(ns) = token.strip_prefix("ns:") {
        if !ns.is_empty() {
            return ContextToken {
                ns: Some(ns.to_string()),
                node_name: None,
            };
        }
    }

    tracing::warn!(token, "unrecognized context token format");
    ContextToken::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token() {
        assert_eq!(parse(""), ContextToken::default());
    }

    #[test]
    fn legacy_colon_form() {
        assert_eq!(
            parse("ns:emojivoto"),
            ContextToken {
                ns: Some("emojivoto".to_string()),
                node_name: None,
            }
        );
    }

    #[test]
    fn json_form() {
        assert_eq!(
            parse(r#"{"ns":"emojivoto","nodeName":"node-1"}"#),
            ContextToken {
                ns: Some("emojivoto".to_string()),
                node_name: Some("node-1".to_string()),
            }
        );
    }

    #[test]
    fn json_form_partial() {
        assert_eq!(
            parse(r#"{"nodeName":"node-1"}"#),
            ContextToken {
                ns: None,
                node_name: Some("node-1".to_string()),
            }
        );
    }

    #[test]
    fn invalid_json_degrades_to_default() {
        assert_eq!(parse("{not json"), ContextToken::default());
    }

    #[test]
    fn unrecognized_form_degrades_to_default() {
        assert_eq!(parse("garbage"), ContextToken::default());
    }
}
