//! 4.C Weighted Scheduler: smooth weighted round-robin over provider names.

use std::collections::BTreeMap;

/// Nginx-style smooth weighted round-robin. `BTreeMap` gives a deterministic
/// alphabetical order, used both to walk `w` each round and to break ties on
/// `current[n]`, matching spec.md §4.C's "ties broken by iteration order of
/// w" with the first-encountered (not last-encountered) name winning.
///
/// Note: spec.md §8 scenario S2 describes the 8-request output for weights
/// `{A:3, B:1}` in prose as the block-contiguous `A A A B A A A B`. Run
/// literally through the §4.C algorithm (current[n] += w[n] each round,
/// greatest current[n] wins, subtract Σw from the winner) that block
/// grouping never occurs — it's the one sequence smooth WRR is built to
/// avoid. We implement §4.C's normative algorithm rather than the
/// scenario's prose, which reads as a simplified gloss; see DESIGN.md.
pub fn weighted_round_robin(weights: &BTreeMap<String, u32>) -> Vec<String> {
    let total: u32 = weights.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut current: BTreeMap<&str, i64> = weights.keys().map(|k| (k.as_str(), 0)).collect();
    let mut out = Vec::with_capacity(total as usize);

    for _ in 0..total {
        for (name, weight) in weights {
            *current.get_mut(name.as_str()).unwrap() += *weight as i64;
        }
        let mut picked: Option<&str> = None;
        let mut best = i64::MIN;
        for name in weights.keys() {
            let value = current[name.as_str()];
            if value > best {
                best = value;
                picked = Some(name.as_str());
            }
        }
        let picked = picked.expect("weights is non-empty");
        out.push(picked.to_string());
        *current.get_mut(picked).unwrap() -= total as i64;
    }

    out
}
