//! Fallback profile listener (§4.6): composes a primary `ProfileStream`
//! (keyed by the caller's namespace, when a context token supplied one)
//! with a secondary one (keyed by the service's own namespace) and forwards
//! the primary's value whenever it's *present*, falling back to the
//! secondary otherwise.

use linkerd_destination_core::{Profile, ProfileStream};
use tokio_stream::{Stream, StreamExt};

#[derive(Copy, Clone, Eq, PartialEq)]
enum Presence {
    /// No `ServiceProfile` resolves for this target.
    Absent,
    /// A `ServiceProfile` resolves but carries no routes, retry budget, or
    /// traffic-split overrides.
    Empty,
    /// A `ServiceProfile` with actual routing policy resolves.
    Present,
}

fn presence(profile: &Option<Profile>) -> Presence {
    match profile {
        None => Presence::Absent,
        Some(p) if p.routes.is_empty() && p.retry_budget.is_none() && p.dst_overrides.is_empty() => {
            Presence::Empty
        }
        Some(_) => Presence::Present,
    }
}

/// Drives `primary` and `secondary` concurrently, emitting only when the
/// effective (primary-if-present-else-secondary) value actually changes.
pub fn merge(
    mut primary: ProfileStream,
    mut secondary: ProfileStream,
) -> impl Stream<Item = Option<Profile>> {
    async_stream::stream! {
        let mut primary_value: Option<Profile> = None;
        let mut secondary_value: Option<Profile> = None;
        let mut last_emitted: Option<Option<Profile>> = None;

        loop {
            tokio::select! {
                next = primary.next() => match next {
                    Some(p) => primary_value = p,
                    None => return,
                },
                next = secondary.next() => match next {
                    Some(p) => secondary_value = p,
                    None => return,
                },
            }

            let effective = if presence(&primary_value) == Presence::Present {
                primary_value.clone()
            } else {
                secondary_value.clone()
            };

            if last_emitted.as_ref() != Some(&effective) {
                last_emitted = Some(effective.clone());
                yield effective;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use linkerd_destination_core::Profile;

    /// Real `ProfileStream`s never terminate (they're backed by a `watch`
    /// channel for the lifetime of the subscription), so pad test fixtures
    /// with a pending tail rather than letting them exhaust to `None`.
    fn boxed(values: Vec<Option<Profile>>) -> ProfileStream {
        Box::pin(stream::iter(values).chain(stream::pending()))
    }

    #[tokio::test]
    async fn falls_back_when_primary_absent() {
        let primary = boxed(vec![None]);
        let secondary = boxed(vec![Some(Profile::empty("web.prod.svc.cluster.local"))]);

        let out = merge(primary, secondary);
        tokio::pin!(out);

        // Only the secondary's value is ever observed, since primary never
        // becomes present.
        let first = tokio::time::timeout(std::time::Duration::from_millis(50), out.next())
            .await
            .unwrap();
        assert_eq!(
            first,
            Some(Some(Profile::empty("web.prod.svc.cluster.local")))
        );
    }

    #[tokio::test]
    async fn prefers_present_primary() {
        let mut present = Profile::empty("web.prod.svc.cluster.local");
        present.dst_overrides.push(linkerd_destination_core::WeightedDst {
            authority: "web-v2.prod.svc.cluster.local".to_string(),
            weight: 100,
        });
        let primary = boxed(vec![Some(present.clone())]);
        let secondary = boxed(vec![Some(Profile::empty("web.prod.svc.cluster.local"))]);

        let out = merge(primary, secondary);
        tokio::pin!(out);
        let first = tokio::time::timeout(std::time::Duration::from_millis(50), out.next())
            .await
            .unwrap();
        assert_eq!(first, Some(Some(present)));
    }
}
