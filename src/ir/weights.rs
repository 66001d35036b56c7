//! Weight normalization.
//!
//! Group members declare independent percentage intents; the data plane
//! wants a cumulative table: each member carries the running total, and the
//! final member carries exactly 100. A group whose weights cannot be
//! normalized is rejected whole — it yields zero clusters and exactly one
//! error — never partially normalized.

use crate::diagnostics::DiagnosticSink;
use crate::ir::mapping::Mapping;
use crate::ir::{HttpGroupId, IrSnapshot, TcpGroupId};

/// Assign cumulative weights to the members of one group.
///
/// Returns false (posting exactly one error against `resource`) when any
/// explicit weight exceeds 100, the explicit total exceeds 100, or an
/// all-explicit group does not land on exactly 100.
pub fn normalize_member_weights(
    mappings: &mut [Mapping],
    resource: &str,
    sink: &DiagnosticSink,
) -> bool {
    let ok = assign_cumulative_weights(mappings, resource, sink);
    if !ok {
        // A rejected group is never left partially normalized.
        for mapping in mappings.iter_mut() {
            mapping.cumulative_weight = None;
        }
    }
    ok
}

fn assign_cumulative_weights(
    mappings: &mut [Mapping],
    resource: &str,
    sink: &DiagnosticSink,
) -> bool {
    if mappings.is_empty() {
        return true;
    }

    if mappings.len() == 1 {
        mappings[0].cumulative_weight = Some(100);
        return true;
    }

    let mut cumulative: u32 = 0;
    let mut weightless: Vec<usize> = Vec::new();

    for (idx, mapping) in mappings.iter_mut().enumerate() {
        match mapping.weight {
            Some(weight) if weight > 100 => {
                sink.post_error(
                    resource,
                    format!("mapping {} has invalid weight {}", mapping.name, weight),
                );
                return false;
            }
            Some(weight) => {
                cumulative += weight;
                mapping.cumulative_weight = Some(cumulative);
            }
            None => weightless.push(idx),
        }
    }

    if cumulative > 100 {
        sink.post_error(
            resource,
            format!("total explicit weight {} of mappings exceeds 100", cumulative),
        );
        return false;
    }

    if weightless.is_empty() {
        if cumulative != 100 {
            sink.post_error(
                resource,
                format!("explicit weights of mappings total {}, must total 100", cumulative),
            );
            return false;
        }
        return true;
    }

    // Weightless members split the remaining budget evenly; the final one
    // is pinned to exactly 100 to absorb rounding error.
    let remaining = 100 - cumulative;
    let share = (f64::from(remaining) / weightless.len() as f64).round() as u32;

    let last = *weightless.last().expect("weightless is non-empty");
    for idx in weightless {
        if idx == last {
            cumulative = 100;
        } else {
            cumulative += share;
        }
        mappings[idx].cumulative_weight = Some(cumulative);
    }

    true
}

/// Normalize every group in the snapshot, marking failed groups invalid so
/// downstream synthesis skips them.
pub fn normalize_snapshot(snapshot: &mut IrSnapshot, sink: &DiagnosticSink) {
    for idx in 0..snapshot.http_group_count() {
        let id = HttpGroupId(idx as u32);
        let resource = snapshot.http_group(id).resource_ref();
        let group = snapshot.http_group_mut(id);
        let valid = normalize_member_weights(&mut group.mappings, &resource, sink);
        group.weights_valid = valid;

        if !valid {
            tracing::debug!(group = %resource, "weight normalization failed, group excluded");
        }
    }

    for idx in 0..snapshot.tcp_group_count() {
        let id = TcpGroupId(idx as u32);
        let resource = snapshot.tcp_group(id).resource_ref();
        let group = snapshot.tcp_group_mut(id);
        let valid = normalize_member_weights(&mut group.mappings, &resource, sink);
        group.weights_valid = valid;
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Whenever normalization succeeds, the cumulative sequence is
        /// non-decreasing and ends at exactly 100.
        #[test]
        fn normalized_weights_are_cumulative_to_100(
            weights in prop::collection::vec(prop::option::of(0u32..=120), 1..8)
        ) {
            let sink = crate::diagnostics::DiagnosticSink::new();
            let mut mappings: Vec<_> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let mut m = crate::ir::mapping::Mapping::to_service(
                        format!("m{}", i),
                        format!("svc-{}", i),
                    );
                    m.weight = *w;
                    m
                })
                .collect();

            if normalize_member_weights(&mut mappings, "g", &sink) {
                let cumulative: Vec<u32> =
                    mappings.iter().map(|m| m.cumulative_weight.unwrap()).collect();

                prop_assert!(cumulative.windows(2).all(|w| w[0] <= w[1]));
                prop_assert_eq!(*cumulative.last().unwrap(), 100);
                prop_assert!(sink.is_empty());
            } else {
                // Rejected groups post exactly one error and are never
                // left partially normalized.
                prop_assert_eq!(sink.len(), 1);
                prop_assert!(mappings.iter().all(|m| m.cumulative_weight.is_none()));
            }
        }
    }
}
