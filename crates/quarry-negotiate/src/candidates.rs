//! Candidate ordering.
//!
//! A server usually tells us its protocol number in the status ping, but
//! proxies and modded servers lie often enough that the number alone is
//! not trusted. The candidate list starts with the reported number, walks
//! outward from it, and finishes with a fixed fallback list.

use quarry_protocol::Endpoint;

use crate::trial::Pinger;

/// Builds the ordered, duplicate-free list of versions to try.
///
/// With `reported = Some(r)` the order is `r`, then `r-1, r+1, r-2, r+2`
/// and so on out to `window_radius`, then `defaults`. Window values that
/// are not positive are skipped. Without a reported version the result is
/// `defaults` with duplicates removed. The first occurrence of a value
/// always wins.
pub fn build_candidates(
    reported: Option<i32>,
    defaults: &[i32],
    window_radius: u32,
) -> Vec<i32> {
    let mut out = Vec::with_capacity(defaults.len() + 1 + 2 * window_radius as usize);

    if let Some(r) = reported {
        push_unique(&mut out, r);
        for offset in 1..=window_radius as i32 {
            for v in [r.checked_sub(offset), r.checked_add(offset)].into_iter().flatten() {
                if v > 0 {
                    push_unique(&mut out, v);
                }
            }
        }
    }
    for &v in defaults {
        push_unique(&mut out, v);
    }
    out
}

fn push_unique(out: &mut Vec<i32>, value: i32) {
    if !out.contains(&value) {
        out.push(value);
    }
}

/// Asks the server which version it speaks and turns the answer into a
/// candidate list.
pub struct VersionProbe<P: Pinger> {
    pinger: P,
}

impl<P: Pinger> VersionProbe<P> {
    pub fn new(pinger: P) -> Self {
        Self { pinger }
    }

    /// The version the server reports, or `None` if the ping failed or the
    /// answer is not a usable protocol number.
    pub async fn reported_version(&self, endpoint: &Endpoint) -> Option<i32> {
        match self.pinger.ping(endpoint).await {
            Ok(status) if status.version.protocol > 0 => {
                tracing::info!(
                    %endpoint,
                    protocol = status.version.protocol,
                    name = %status.version.name,
                    "server reported protocol version"
                );
                Some(status.version.protocol)
            }
            Ok(status) => {
                tracing::warn!(
                    %endpoint,
                    protocol = status.version.protocol,
                    "server reported an unusable protocol number"
                );
                None
            }
            Err(e) => {
                tracing::warn!(%endpoint, error = %e, "status ping failed, using fallback candidates");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_candidates_reported_window_then_defaults() {
        let out = build_candidates(Some(770), &[768, 769, 770, 771, 766], 2);
        assert_eq!(out, vec![770, 769, 771, 768, 772, 766]);
    }

    #[test]
    fn test_build_candidates_no_report_is_deduplicated_defaults() {
        let out = build_candidates(None, &[767, 768, 767, 766, 768], 2);
        assert_eq!(out, vec![767, 768, 766]);
    }

    #[test]
    fn test_build_candidates_zero_radius_only_reported() {
        let out = build_candidates(Some(767), &[], 0);
        assert_eq!(out, vec![767]);
    }

    #[test]
    fn test_build_candidates_skips_non_positive_window_values() {
        let out = build_candidates(Some(2), &[], 3);
        assert_eq!(out, vec![2, 1, 3, 4, 5]);
    }

    #[test]
    fn test_build_candidates_extreme_reported_does_not_overflow() {
        let out = build_candidates(Some(i32::MAX), &[], 1);
        assert_eq!(out, vec![i32::MAX, i32::MAX - 1]);
    }

    #[test]
    fn test_build_candidates_properties_hold_across_inputs() {
        let defaults = [767, 768, 766, 769, 770, 771, 765];
        for reported in [None, Some(1), Some(5), Some(700), Some(767), Some(771), Some(4000)] {
            for radius in 0..6 {
                let out = build_candidates(reported, &defaults, radius);
                let mut sorted = out.clone();
                sorted.sort_unstable();
                sorted.dedup();
                assert_eq!(sorted.len(), out.len(), "duplicates for {reported:?}/{radius}");
                if let Some(r) = reported {
                    assert_eq!(out[0], r);
                }
                for d in defaults {
                    assert!(out.contains(&d));
                }
            }
        }
    }
}
