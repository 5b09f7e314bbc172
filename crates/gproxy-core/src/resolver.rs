//! 4.D Provider Resolver.

use std::collections::BTreeMap;

use gproxy_common::{ApiKeyRecord, GatewayConfig, Provider};

use crate::error::GatewayError;
use crate::scheduler::weighted_round_robin;

/// One rule produced by Stage 1 of resolution: either "any provider named
/// P offering the requested model" (bare/wildcard) or "provider P, but only
/// if its alias for the requested model is exactly M" (scoped).
enum Rule<'a> {
    AnyModelFrom { provider: &'a str },
    ScopedExact { provider: &'a str, alias: &'a str },
}

/// Resolves `(model_name, token)` into the ordered candidate provider list
/// (spec.md §4.D). Duplicates from overlapping rules are intentional and
/// preserved — see spec.md §9 "Rule expansion duplication".
pub fn resolve_candidates<'a>(
    config: &'a GatewayConfig,
    model_name: &str,
    token: &str,
) -> Result<Vec<&'a Provider>, GatewayError> {
    let record = config
        .record_for_token(token)
        .ok_or(GatewayError::NoMatchingModel)?;

    if record.model.is_empty() {
        return Err(GatewayError::NoMatchingModel);
    }

    let rules = expand_rules(record);
    let mut candidates = materialize(config, &rules, model_name);

    if candidates.is_empty() {
        return Err(GatewayError::NoMatchingModel);
    }

    if let Some(weights) = &record.weights {
        candidates = apply_weights(candidates, weights);
    }

    Ok(candidates)
}

/// Stage 1 — expand `rec.model` entries into provider-scoped rules.
fn expand_rules<'a>(record: &'a ApiKeyRecord) -> Vec<Rule<'a>> {
    let mut rules = Vec::new();
    for entry in &record.model {
        if let Some((provider, alias)) = entry.split_once('/') {
            rules.push(if alias == "*" {
                Rule::AnyModelFrom { provider }
            } else {
                Rule::ScopedExact { provider, alias }
            });
        } else {
            // Bare alias `m`: one rule per provider that offers it,
            // equivalent to expanding into "<provider>/<m>" per spec.md.
            rules.push(Rule::ScopedExact {
                provider: "", // filled in during materialization: matches any provider
                alias: entry.as_str(),
            });
        }
    }
    rules
}

/// Stage 2 — scan `providers` in declared order, appending every match for
/// every rule. A bare-alias rule (empty `provider`) matches any provider
/// that offers the model; all other rules are scoped to their named
/// provider.
fn materialize<'a>(
    config: &'a GatewayConfig,
    rules: &[Rule<'a>],
    model_name: &str,
) -> Vec<&'a Provider> {
    let mut out = Vec::new();
    for rule in rules {
        for provider in &config.providers {
            match rule {
                Rule::AnyModelFrom { provider: name } => {
                    if provider.provider == *name && provider.offers(model_name) {
                        out.push(provider);
                    }
                }
                Rule::ScopedExact { provider: name, alias } => {
                    let provider_matches = name.is_empty() || provider.provider == *name;
                    if provider_matches && provider.offers(model_name) && *alias == model_name {
                        out.push(provider);
                    }
                }
            }
        }
    }
    out
}

/// Stage 3 — intersect `rec.weights` with the candidate provider names,
/// build the weighted interleaving, then re-order `candidates` by walking
/// that sequence and emitting the first unconsumed candidate of each name.
fn apply_weights<'a>(
    candidates: Vec<&'a Provider>,
    weights: &BTreeMap<String, u32>,
) -> Vec<&'a Provider> {
    let present: std::collections::BTreeSet<&str> =
        candidates.iter().map(|p| p.provider.as_str()).collect();
    let filtered: BTreeMap<String, u32> = weights
        .iter()
        .filter(|(name, _)| present.contains(name.as_str()))
        .map(|(name, weight)| (name.clone(), *weight))
        .collect();

    if filtered.is_empty() {
        return candidates;
    }

    let order = weighted_round_robin(&filtered);
    let mut pools: BTreeMap<&str, std::collections::VecDeque<&Provider>> = BTreeMap::new();
    for candidate in &candidates {
        pools
            .entry(candidate.provider.as_str())
            .or_default()
            .push_back(candidate);
    }

    let mut out = Vec::with_capacity(candidates.len());
    for name in &order {
        if let Some(pool) = pools.get_mut(name.as_str())
            && let Some(candidate) = pool.pop_front()
        {
            out.push(candidate);
        }
    }
    out
}

/// Supplemented feature (SPEC_FULL.md §11): the set of logical aliases a
/// caller's key can reach, reusing Stage 1's rule expansion rather than a
/// second listing path.
pub fn visible_models(config: &GatewayConfig, token: &str) -> Vec<String> {
    let Some(record) = config.record_for_token(token) else {
        return Vec::new();
    };

    let mut aliases = std::collections::BTreeSet::new();
    for entry in &record.model {
        if let Some((provider_name, alias)) = entry.split_once('/') {
            for provider in &config.providers {
                if provider.provider != provider_name {
                    continue;
                }
                if alias == "*" {
                    aliases.extend(provider.model.keys().cloned());
                } else if provider.offers(alias) {
                    aliases.insert(alias.to_string());
                }
            }
        } else {
            for provider in &config.providers {
                if provider.offers(entry) {
                    aliases.insert(entry.clone());
                }
            }
        }
    }
    aliases.into_iter().collect()
}
