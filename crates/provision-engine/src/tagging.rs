//! Tag matching
//!
//! Pure evaluation of tag rules against a node's attributes. `like` is an
//! unanchored regular expression search, so a plain value acts as a
//! substring test. Tags are recomputed on every request and never stored.

use std::collections::BTreeSet;

use provision_model::{Comparator, Node, TagMatcher, TagRule};
use regex::Regex;
use tracing::debug;

/// Evaluates one matcher; a missing attribute or invalid pattern is false
/// before inversion
pub fn matcher_matches(matcher: &TagMatcher, node: &Node) -> bool {
    let raw = match node.attribute(&matcher.key) {
        Some(value) => match matcher.compare {
            Comparator::Equal => value == matcher.value,
            Comparator::Like => match Regex::new(&matcher.value) {
                Ok(re) => re.is_match(&value),
                Err(e) => {
                    debug!("Tag matcher {} has invalid pattern: {}", matcher.uuid, e);
                    false
                }
            },
        },
        None => false,
    };
    raw != matcher.inverse
}

/// True when the rule has matchers and all of them succeed
pub fn rule_matches(rule: &TagRule, node: &Node) -> bool {
    !rule.tag_matchers.is_empty() && rule.tag_matchers.iter().all(|m| matcher_matches(m, node))
}

/// Distinct tags contributed by every satisfied rule, sorted
pub fn matched_tags(rules: &[TagRule], node: &Node) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| rule_matches(rule, node))
        .map(|rule| rule.tag.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
