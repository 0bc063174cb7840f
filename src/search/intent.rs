/**
 * Intent Parser
 *
 * DESIGN DECISION: Fixed vocabulary of named intents, each matched by a
 * small keyword rule, rather than a learned classifier
 * WHY: The intent set is closed and small; a rule list is auditable and
 * needs no training data, the same keyword-rule style this module is
 * grounded on for parsing natural-language claims into structured checks
 *
 * PATTERN: Keyword-rule intent classification
 */

use crate::pattern::Language;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMatch {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub pure: bool,
    pub r#async: bool,
    pub tested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intents: Vec<IntentMatch>,
    pub language: Option<Language>,
    pub constraints: Constraints,
}

struct Rule {
    name: &'static str,
    keywords: &'static [&'static str],
}

const RULES: &[Rule] = &[
    Rule { name: "validate", keywords: &["validate", "validation", "check", "assert", "sanitize"] },
    Rule { name: "transform", keywords: &["transform", "convert", "map", "parse", "serialize"] },
    Rule { name: "debounce-throttle", keywords: &["debounce", "throttle", "rate limit", "delay"] },
    Rule { name: "persist", keywords: &["save", "store", "persist", "write to disk", "database"] },
    Rule { name: "fetch", keywords: &["fetch", "request", "http", "api call", "download"] },
    Rule { name: "auth", keywords: &["login", "auth", "token", "session", "permission"] },
    Rule { name: "search-sort", keywords: &["sort", "search", "find", "filter", "rank"] },
    Rule { name: "concurrency", keywords: &["thread", "async", "concurrent", "lock", "mutex"] },
];

/// Parses `term` (a free-text search query or resolve description) into a
/// ranked intent list plus any language/constraint cues found in it.
pub fn parse(term: &str) -> Intent {
    let lower = term.to_ascii_lowercase();

    let mut intents: Vec<IntentMatch> = RULES
        .iter()
        .filter_map(|rule| {
            let hits = rule.keywords.iter().filter(|kw| lower.contains(*kw)).count();
            if hits == 0 {
                None
            } else {
                let confidence = (hits as f64 / rule.keywords.len() as f64).min(1.0).max(0.3);
                Some(IntentMatch {
                    name: rule.name.to_string(),
                    confidence,
                })
            }
        })
        .collect();
    intents.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let language = [
        Language::Javascript,
        Language::Typescript,
        Language::Python,
        Language::Go,
        Language::Rust,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Csharp,
    ]
    .into_iter()
    .find(|lang| lower.contains(lang.as_str()));

    let constraints = Constraints {
        pure: lower.contains("pure") || lower.contains("no side effect"),
        r#async: lower.contains("async") || lower.contains("await") || lower.contains("concurrent"),
        tested: lower.contains("tested") || lower.contains("with tests"),
    };

    Intent {
        intents,
        language,
        constraints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_validation_intent() {
        let intent = parse("validate that a user's email is well formed");
        assert_eq!(intent.intents.first().unwrap().name, "validate");
    }

    #[test]
    fn test_parses_language_cue() {
        let intent = parse("a rust function that sorts a vector");
        assert_eq!(intent.language, Some(Language::Rust));
        assert!(intent.intents.iter().any(|i| i.name == "search-sort"));
    }

    #[test]
    fn test_parses_constraints() {
        let intent = parse("an async pure function, tested, that fetches data");
        assert!(intent.constraints.pure);
        assert!(intent.constraints.r#async);
        assert!(intent.constraints.tested);
    }

    #[test]
    fn test_no_match_returns_empty_intents() {
        let intent = parse("zzz qqq xyzzy");
        assert!(intent.intents.is_empty());
    }
}
