//! Raw OCR text cleanup
//!
//! Maps look-alike characters onto digits, keeps only the field's alphabet and
//! truncates. Fields with a literal prefix (e.g. "PEA") first try to pull the
//! run of digits and look-alikes that follows it.

use regex::Regex;
use std::collections::HashMap;

use crate::config::NormalizationRules;

/// Per-field text normalizer
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    substitutions: HashMap<char, char>,
    alphabet: Vec<char>,
    max_len: usize,
    prefix_pattern: Option<Regex>,
}

impl TextNormalizer {
    /// Compile the rules of one field
    pub fn new(rules: &NormalizationRules) -> Result<Self, regex::Error> {
        let mut substitutions = HashMap::new();
        for rule in &rules.confusables {
            for c in rule.lookalikes.chars() {
                substitutions.insert(c, rule.digit);
            }
        }

        // The run after the prefix may still hold look-alikes, so capture
        // alphabet and confusable characters alike and clean them afterwards
        let prefix_pattern = match rules.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                let run_class: String = rules
                    .alphabet
                    .chars()
                    .chain(substitutions.keys().copied())
                    .filter(|c| !c.is_whitespace())
                    .map(|c| regex::escape(&c.to_string()))
                    .collect();
                Some(Regex::new(&format!(
                    r"{}\s*([{}]+)",
                    regex::escape(prefix),
                    run_class
                ))?)
            }
            _ => None,
        };

        Ok(Self {
            substitutions,
            alphabet: rules.alphabet.chars().collect(),
            max_len: rules.max_len,
            prefix_pattern,
        })
    }

    /// Normalize raw engine output; an empty result means "no read"
    pub fn normalize(&self, raw: &str) -> String {
        let raw = raw.trim();

        if let Some(pattern) = &self.prefix_pattern {
            if let Some(digits) = pattern.captures(raw).and_then(|c| c.get(1)) {
                return self.clean(digits.as_str());
            }
        }

        self.clean(raw)
    }

    fn clean(&self, text: &str) -> String {
        text.chars()
            .map(|c| self.substitutions.get(&c).copied().unwrap_or(c))
            .filter(|c| self.alphabet.contains(c))
            .take(self.max_len)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(prefix: Option<&str>) -> TextNormalizer {
        let rules = NormalizationRules {
            prefix: prefix.map(str::to_string),
            ..Default::default()
        };
        TextNormalizer::new(&rules).unwrap()
    }

    #[test]
    fn test_confusables_map_to_digits() {
        assert_eq!(normalizer(None).normalize("O1l23"), "01123");
        assert_eq!(normalizer(None).normalize("|I0O"), "1100");
    }

    #[test]
    fn test_filters_to_alphabet() {
        assert_eq!(normalizer(None).normalize(" 12-34 ab\n56 "), "123456");
        assert_eq!(normalizer(None).normalize("xyz"), "");
        assert_eq!(normalizer(None).normalize(""), "");
    }

    #[test]
    fn test_truncates_to_max_len() {
        let rules = NormalizationRules {
            max_len: 4,
            ..Default::default()
        };
        let n = TextNormalizer::new(&rules).unwrap();
        assert_eq!(n.normalize("1234567"), "1234");

        let long = "9".repeat(40);
        assert_eq!(normalizer(None).normalize(&long).len(), 32);
    }

    #[test]
    fn test_prefix_pattern_extracts_digits() {
        let n = normalizer(Some("PEA"));
        assert_eq!(n.normalize("PEA123456"), "123456");
        assert_eq!(n.normalize("No. PEA 020123 meter 77"), "020123");
    }

    #[test]
    fn test_prefix_run_keeps_lookalike_digits() {
        let n = normalizer(Some("PEA"));
        assert_eq!(n.normalize("PEA12O456"), "120456");
        assert_eq!(n.normalize("PEA 1l|7 kWh"), "1117");
        assert_eq!(n.normalize("PEA O2"), "02");
    }

    #[test]
    fn test_prefix_absent_falls_back_to_filtering() {
        let n = normalizer(Some("PEA"));
        assert_eq!(n.normalize("PE 12O3"), "1203");
    }

    #[test]
    fn test_prefix_is_literal() {
        let n = normalizer(Some("A.B"));
        assert_eq!(n.normalize("A.B42"), "42");
        assert_eq!(n.normalize("AxB42"), "42");
        assert_eq!(n.normalize("AxB 9"), "9");
    }

    #[test]
    fn test_custom_alphabet() {
        let rules = NormalizationRules {
            confusables: Vec::new(),
            alphabet: "0123456789.".to_string(),
            max_len: 10,
            prefix: None,
        };
        let n = TextNormalizer::new(&rules).unwrap();
        assert_eq!(n.normalize("kWh 1234.5"), "1234.5");
        assert_eq!(n.normalize("O1"), "1");
    }
}
