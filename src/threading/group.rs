//! Exact and fuzzy grouping of messages by cleaned subject.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::ids;
use crate::model::message::Message;
use crate::model::summary::ThreadGroup;

/// Similarity at or above which two subject buckets are merged.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Similarity ratio of two strings: `2 * LCS / (len(a) + len(b))`, where
/// LCS is the longest common (not necessarily contiguous) subsequence of
/// characters. Two empty strings are identical (`1.0`).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Upper bound of [`similarity`] from lengths alone.
fn max_possible_similarity(len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 1.0;
    }
    2.0 * len_a.min(len_b) as f64 / total as f64
}

struct Bucket<'a> {
    key: String,
    key_len: usize,
    members: Vec<&'a Message>,
}

/// Group messages by the lowercased `clean_subject`, then merge similar
/// buckets.
///
/// Buckets are visited in first-appearance order; each unmerged bucket
/// absorbs every later unmerged bucket whose key similarity is at least
/// `threshold`. Groups are sorted by member count (descending), then by
/// the date of their first member (undated last). The label is the
/// longest member `clean_subject`, first one on ties.
pub fn group_messages(messages: &[Message], threshold: f64) -> Vec<ThreadGroup> {
    let mut buckets: Vec<Bucket<'_>> = Vec::new();
    let mut bucket_index: HashMap<String, usize> = HashMap::new();
    for msg in messages {
        let key = msg.clean_subject.to_lowercase();
        match bucket_index.get(&key) {
            Some(&i) => buckets[i].members.push(msg),
            None => {
                bucket_index.insert(key.clone(), buckets.len());
                buckets.push(Bucket {
                    key_len: key.chars().count(),
                    key,
                    members: vec![msg],
                });
            }
        }
    }

    let mut merged = vec![false; buckets.len()];
    let mut groups: Vec<Vec<&Message>> = Vec::new();
    for i in 0..buckets.len() {
        if merged[i] {
            continue;
        }
        merged[i] = true;
        let mut members = buckets[i].members.clone();
        for j in i + 1..buckets.len() {
            if merged[j]
                || max_possible_similarity(buckets[i].key_len, buckets[j].key_len) < threshold
            {
                continue;
            }
            let ratio = similarity(&buckets[i].key, &buckets[j].key);
            if ratio >= threshold {
                debug!(
                    into = %buckets[i].key,
                    from = %buckets[j].key,
                    ratio,
                    "Merging similar subjects"
                );
                members.extend(buckets[j].members.iter().copied());
                merged[j] = true;
            }
        }
        groups.push(members);
    }

    groups.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| compare_first_dates(a, b))
    });

    groups
        .into_iter()
        .map(|members| {
            let label = longest_subject(&members);
            ThreadGroup {
                group_id: ids::group_id(&label),
                label,
                email_ids: members.iter().map(|m| m.email_id.clone()).collect(),
            }
        })
        .collect()
}

fn compare_first_dates(a: &[&Message], b: &[&Message]) -> Ordering {
    let date_a = a.first().and_then(|m| m.timestamp);
    let date_b = b.first().and_then(|m| m.timestamp);
    match (date_a, date_b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn longest_subject(members: &[&Message]) -> String {
    let mut best: Option<&str> = None;
    for msg in members {
        let subject = msg.clean_subject.as_str();
        if best.is_none_or(|b| subject.chars().count() > b.chars().count()) {
            best = Some(subject);
        }
    }
    best.unwrap_or_default().to_string()
}
