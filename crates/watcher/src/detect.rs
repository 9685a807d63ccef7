//! Freshness detection: decide whether a new observation is the current
//! known state of its URL.

use uuid::Uuid;

use sitewatch_shared::{FetchObservation, PageRecord, content_hash};

/// Fold an observation into a [`PageRecord`], comparing its content digest
/// against the most recently stored record for the same URL.
///
/// Decision rule:
/// - no prior record: the first observation is always canonical;
/// - digest differs from the prior record: content changed, new record is
///   most-recent;
/// - digest matches: content unchanged, record is kept for history but not
///   flagged.
pub fn evaluate(prior: &[PageRecord], observation: &FetchObservation) -> PageRecord {
    let hash = content_hash(&observation.content);

    let is_most_recent = match prior.first() {
        None => true,
        Some(last) => last.content_hash != hash,
    };

    PageRecord {
        id: Uuid::now_v7().to_string(),
        url: observation.url.clone(),
        content: observation.content.clone(),
        content_hash: hash,
        observed_at: observation.observed_at,
        is_most_recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sitewatch_shared::WatchUrl;

    fn observation(content: &str) -> FetchObservation {
        FetchObservation {
            url: WatchUrl::from("http://a.test"),
            content: content.into(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn first_observation_is_always_most_recent() {
        let record = evaluate(&[], &observation("Hello, World!"));
        assert!(record.is_most_recent);
        assert_eq!(record.content, "Hello, World!");
    }

    #[test]
    fn changed_content_is_most_recent() {
        let prior = evaluate(&[], &observation("Hello, World!"));
        let record = evaluate(
            &[prior],
            &observation("Hello, World! 2"),
        );
        assert!(record.is_most_recent);
    }

    #[test]
    fn unchanged_content_is_not_most_recent() {
        let prior = evaluate(&[], &observation("Hello, World!"));
        let record = evaluate(&[prior], &observation("Hello, World!"));
        assert!(!record.is_most_recent);
    }

    #[test]
    fn empty_content_still_produces_a_record() {
        // A failed fetch degrades to an empty-content observation; it is
        // still folded into history.
        let record = evaluate(&[], &observation(""));
        assert!(record.is_most_recent);
        assert_eq!(record.content_hash, content_hash(""));
    }

    /// Replay a serial observation sequence the way the sink would: each
    /// decision sees the latest previously stored record. With demotion on
    /// persist (the storage adapter's job, simulated here), exactly one
    /// record stays flagged.
    #[test]
    fn serial_replay_keeps_one_most_recent() {
        let contents = ["a", "a", "b", "b", "c", "c", "c"];
        let mut stored: Vec<PageRecord> = Vec::new();
        let base = Utc::now();

        for (i, content) in contents.iter().enumerate() {
            let obs = FetchObservation {
                url: WatchUrl::from("http://a.test"),
                content: (*content).into(),
                observed_at: base + Duration::seconds(i as i64),
            };
            let prior: Vec<PageRecord> = stored.last().cloned().into_iter().collect();
            let record = evaluate(&prior, &obs);
            if record.is_most_recent {
                for old in stored.iter_mut() {
                    old.is_most_recent = false;
                }
            }
            stored.push(record);
        }

        assert_eq!(stored.len(), contents.len());
        let flagged: Vec<_> = stored.iter().filter(|r| r.is_most_recent).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].content, "c");
        // The flagged record is the first observation of the final content run.
        assert_eq!(flagged[0].observed_at, stored[4].observed_at);
    }
}
