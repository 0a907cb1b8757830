//! Step normalization: raw model output → canonical `Step N: body\n` string.
//!
//! Parsing is an ordered rule table (first match wins):
//!
//! 1. [`StepRule::NextStepMarker`]: text after `Next step:`, min length 2.
//! 2. [`StepRule::StepColon`]: text between the first colon and the next `Step`, min length 4.
//! 3. [`StepRule::Bare`]: the whole probe, min length 3.
//!
//! Every rule rejects a body that already occurs verbatim in the prior trajectory.
//! The strict table (used once a reflection is available) omits the bare rule and
//! reports a format error instead.

use crate::error::StepRejection;

/// Upper bound on fragments joined into the probe string.
pub const MAX_FRAGMENTS: usize = 5;

const NEXT_STEP_MARKER: &str = "Next step:";
const STEP_TOKEN: &str = "Step";

/// One parsing rule of the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRule {
    NextStepMarker,
    StepColon,
    Bare,
}

/// Rules for plain proposals.
pub const DEFAULT_RULES: &[StepRule] = &[StepRule::NextStepMarker, StepRule::StepColon, StepRule::Bare];

/// Rules for proposals made after a reflection.
pub const STRICT_RULES: &[StepRule] = &[StepRule::NextStepMarker, StepRule::StepColon];

impl StepRule {
    /// Minimum body length in characters (measured where the rule measures it).
    pub fn min_len(self) -> usize {
        match self {
            StepRule::NextStepMarker => 2,
            StepRule::StepColon => 4,
            StepRule::Bare => 3,
        }
    }

    /// Applies the rule to the probe. `None` when the rule does not match.
    fn apply(self, probe: &str) -> Option<Result<String, StepRejection>> {
        match self {
            StepRule::NextStepMarker => {
                if !probe.contains(NEXT_STEP_MARKER) {
                    return None;
                }
                // text up to a second marker, if the model repeated it
                let body = probe.split(NEXT_STEP_MARKER).nth(1).unwrap_or("").trim();
                if body.chars().count() < self.min_len() {
                    return Some(Err(StepRejection::TooShort));
                }
                Some(Ok(body.to_string()))
            }
            StepRule::StepColon => {
                let colon = probe.find(':')?;
                if !probe.contains(STEP_TOKEN) {
                    return None;
                }
                let rest = &probe[colon..];
                let candidate = rest.split(STEP_TOKEN).next().unwrap_or("").trim();
                if candidate.chars().count() < self.min_len() {
                    return Some(Err(StepRejection::TooShort));
                }
                // drop the leading colon left over from the `Step N:` prefix
                let mut chars = candidate.chars();
                chars.next();
                Some(Ok(chars.as_str().trim().to_string()))
            }
            StepRule::Bare => {
                let body = probe.trim();
                if body.chars().count() < self.min_len() {
                    return Some(Err(StepRejection::TooShort));
                }
                Some(Ok(body.to_string()))
            }
        }
    }
}

/// Joins at most [`MAX_FRAGMENTS`] fragments with single spaces and trims.
pub fn probe(fragments: &[String]) -> String {
    fragments
        .iter()
        .take(MAX_FRAGMENTS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Canonical step string for an accepted body.
pub fn format_step(step_index: usize, body: &str) -> String {
    format!("Step {}: {}\n", step_index, body)
}

/// Parses raw model output into canonical step strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepNormalizer;

impl StepNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes a plain proposal (all three rules).
    pub fn normalize(
        &self,
        fragments: &[String],
        prior: &str,
        step_index: usize,
    ) -> Result<String, StepRejection> {
        Self::apply_rules(DEFAULT_RULES, fragments, prior, step_index)
    }

    /// Normalizes a proposal made after a reflection (no bare fallback).
    pub fn normalize_with_reflection(
        &self,
        fragments: &[String],
        prior: &str,
        step_index: usize,
    ) -> Result<String, StepRejection> {
        Self::apply_rules(STRICT_RULES, fragments, prior, step_index)
    }

    fn apply_rules(
        rules: &[StepRule],
        fragments: &[String],
        prior: &str,
        step_index: usize,
    ) -> Result<String, StepRejection> {
        if fragments.is_empty() {
            return Err(StepRejection::NoResponse);
        }
        let p = probe(fragments);
        let body = rules
            .iter()
            .find_map(|rule| rule.apply(&p))
            .unwrap_or(Err(StepRejection::FormatError))?;
        if prior.contains(body.as_str()) {
            return Err(StepRejection::Repeated);
        }
        Ok(format_step(step_index, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn next_step_marker_takes_text_after_marker() {
        let n = StepNormalizer::new();
        let out = n
            .normalize(&frags(&["Analysis done.", "Next step: compute 2 + 2 = 4"]), "", 2)
            .unwrap();
        assert_eq!(out, "Step 2: compute 2 + 2 = 4\n");
    }

    #[test]
    fn next_step_marker_stops_at_repeated_marker() {
        let n = StepNormalizer::new();
        let out = n
            .normalize(&frags(&["Next step: add them Next step: again"]), "", 1)
            .unwrap();
        assert_eq!(out, "Step 1: add them\n");
    }

    #[test]
    fn next_step_marker_rejects_short_body() {
        let n = StepNormalizer::new();
        assert_eq!(
            n.normalize(&frags(&["Next step: x"]), "", 1),
            Err(StepRejection::TooShort)
        );
    }

    #[test]
    fn step_colon_keeps_text_until_next_step_token() {
        let n = StepNormalizer::new();
        let out = n
            .normalize(
                &frags(&["Step 3: factor the quadratic.", "Step 4: solve each factor."]),
                "Step 1: a\nStep 2: b\n",
                3,
            )
            .unwrap();
        assert_eq!(out, "Step 3: factor the quadratic.\n");
    }

    #[test]
    fn step_colon_rejects_short_body() {
        let n = StepNormalizer::new();
        assert_eq!(
            n.normalize(&frags(&["Step 2: a"]), "", 2),
            Err(StepRejection::TooShort)
        );
    }

    #[test]
    fn bare_text_is_accepted_as_body() {
        let n = StepNormalizer::new();
        let out = n.normalize(&frags(&["  multiply both sides by 3 "]), "", 1).unwrap();
        assert_eq!(out, "Step 1: multiply both sides by 3\n");
    }

    #[test]
    fn bare_text_rejects_short_body() {
        let n = StepNormalizer::new();
        assert_eq!(n.normalize(&frags(&["ok"]), "", 1), Err(StepRejection::TooShort));
    }

    #[test]
    fn empty_response_is_rejected() {
        let n = StepNormalizer::new();
        assert_eq!(n.normalize(&[], "", 1), Err(StepRejection::NoResponse));
        assert_eq!(
            n.normalize_with_reflection(&[], "", 1),
            Err(StepRejection::NoResponse)
        );
    }

    #[test]
    fn only_first_five_fragments_are_read() {
        let n = StepNormalizer::new();
        let out = n
            .normalize(&frags(&["a1", "a2", "a3", "a4", "a5", "Next step: hidden"]), "", 1)
            .unwrap();
        assert_eq!(out, "Step 1: a1 a2 a3 a4 a5\n");
    }

    #[test]
    fn duplicate_body_is_rejected_in_every_branch() {
        let n = StepNormalizer::new();
        let prior = "Step 1: compute 2 + 2 = 4\n";
        assert_eq!(
            n.normalize(&frags(&["Next step: compute 2 + 2 = 4"]), prior, 2),
            Err(StepRejection::Repeated)
        );
        assert_eq!(
            n.normalize(&frags(&["Step 2: compute 2 + 2 = 4"]), prior, 2),
            Err(StepRejection::Repeated)
        );
        assert_eq!(
            n.normalize(&frags(&["compute 2 + 2 = 4"]), prior, 2),
            Err(StepRejection::Repeated)
        );
    }

    #[test]
    fn strict_mode_reports_format_error_for_bare_text() {
        let n = StepNormalizer::new();
        assert_eq!(
            n.normalize_with_reflection(&frags(&["just some text"]), "", 2),
            Err(StepRejection::FormatError)
        );
        let out = n
            .normalize_with_reflection(&frags(&["Next step: divide by two"]), "", 2)
            .unwrap();
        assert_eq!(out, "Step 2: divide by two\n");
    }

    #[test]
    fn strict_mode_accepts_step_colon() {
        let n = StepNormalizer::new();
        let out = n
            .normalize_with_reflection(&frags(&["Step 2: factor the quadratic"]), "Step 1: a\n", 2)
            .unwrap();
        assert_eq!(out, "Step 2: factor the quadratic\n");
    }

    #[test]
    fn strict_mode_rejects_short_bodies() {
        let n = StepNormalizer::new();
        assert_eq!(
            n.normalize_with_reflection(&frags(&["Next step: x"]), "", 2),
            Err(StepRejection::TooShort)
        );
        assert_eq!(
            n.normalize_with_reflection(&frags(&["Step 2: a"]), "", 2),
            Err(StepRejection::TooShort)
        );
    }

    #[test]
    fn strict_mode_rejects_duplicates() {
        let n = StepNormalizer::new();
        let prior = "Step 1: halve both sides\n";
        assert_eq!(
            n.normalize_with_reflection(&frags(&["Next step: halve both sides"]), prior, 2),
            Err(StepRejection::Repeated)
        );
        assert_eq!(
            n.normalize_with_reflection(&frags(&["Step 2: halve both sides"]), prior, 2),
            Err(StepRejection::Repeated)
        );
    }

    #[test]
    fn accepted_output_always_matches_step_format() {
        let n = StepNormalizer::new();
        let inputs = [
            vec!["Next step: alpha beta"],
            vec!["Step 9: gamma delta", "Step 10: x"],
            vec!["epsilon zeta"],
            vec!["Some prose: with a colon but no marker Step"],
        ];
        for (i, input) in inputs.iter().enumerate() {
            let step_index = i + 1;
            if let Ok(out) = n.normalize(&frags(input), "", step_index) {
                let prefix = format!("Step {}: ", step_index);
                assert!(out.starts_with(&prefix), "{:?}", out);
                assert!(out.ends_with('\n'), "{:?}", out);
                let body = &out[prefix.len()..out.len() - 1];
                assert!(!body.trim().is_empty(), "{:?}", out);
            }
        }
    }

    #[test]
    fn colon_without_step_token_falls_through_to_bare() {
        let n = StepNormalizer::new();
        let out = n.normalize(&frags(&["ratio: 3 to 4"]), "", 1).unwrap();
        assert_eq!(out, "Step 1: ratio: 3 to 4\n");
    }
}
