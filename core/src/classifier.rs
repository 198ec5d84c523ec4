//! Product family classifier: first match wins over a priority-ordered rule list.
//!
//! Rules are compiled once into an immutable list sorted by priority
//! (stable, so equal priorities keep their configured order). Classification
//! keeps an index set of still-unlabeled descriptions; each rule is tried only
//! against that open set and freezes a label on every match. Rule order is
//! semantic: a later rule never relabels a line an earlier rule claimed.

use crate::{
    config::FamilyRule,
    error::{RetentionError, RetentionResult},
    types::{FamilyLabel, OTHER_FAMILY},
};
use regex::{Regex, RegexBuilder};

struct CompiledRule {
    priority:     u32,
    family_label: FamilyLabel,
    matcher:      Regex,
}

pub struct FamilyClassifier {
    rules: Vec<CompiledRule>,
}

impl FamilyClassifier {
    pub fn new(rules: &[FamilyRule]) -> RetentionResult<Self> {
        let mut ordered: Vec<&FamilyRule> = rules.iter().collect();
        ordered.sort_by_key(|r| r.priority);

        let rules = ordered
            .into_iter()
            .map(|rule| {
                let matcher = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RetentionError::InvalidRule {
                        priority: rule.priority,
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                Ok(CompiledRule {
                    priority: rule.priority,
                    family_label: rule.family_label.clone(),
                    matcher,
                })
            })
            .collect::<RetentionResult<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Label every description. Output is index-aligned with the input.
    pub fn classify_all<S: AsRef<str>>(&self, descriptions: &[S]) -> Vec<FamilyLabel> {
        let mut labels: Vec<Option<&str>> = vec![None; descriptions.len()];
        let mut open: Vec<usize> = (0..descriptions.len()).collect();

        for rule in &self.rules {
            if open.is_empty() {
                break;
            }
            let before = open.len();
            open.retain(|&idx| {
                if rule.matcher.is_match(descriptions[idx].as_ref()) {
                    labels[idx] = Some(rule.family_label.as_str());
                    false
                } else {
                    true
                }
            });
            log::debug!(
                "classifier: rule priority={} label={} claimed {} lines ({} still open)",
                rule.priority,
                rule.family_label,
                before - open.len(),
                open.len(),
            );
        }

        labels
            .into_iter()
            .map(|label| label.unwrap_or(OTHER_FAMILY).to_string())
            .collect()
    }

    pub fn classify(&self, description: &str) -> FamilyLabel {
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(description))
            .map(|rule| rule.family_label.clone())
            .unwrap_or_else(|| OTHER_FAMILY.to_string())
    }
}
