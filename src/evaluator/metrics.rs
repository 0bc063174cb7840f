/**
 * Coherency Metrics
 *
 * DESIGN DECISION: Cheap syntactic heuristics for each dimension rather
 * than a full parser
 * WHY: The Evaluator has to score arbitrary snippets in any of nine
 * languages without a toolchain for any of them; character/line/token
 * heuristics get a useful signal without needing a real compiler front
 * end, matching the heuristic scoring style this module generalizes from
 * a pattern-quality checklist to a coherency dimension set.
 *
 * PATTERN: Heuristic static-analysis scoring
 */

use crate::pattern::{Complexity, Language};
use std::collections::HashSet;

/// Guesses a [`Language`] from syntactic cues in `code`. Falls back to
/// `Language::Unknown` when nothing matches.
pub fn infer_language(code: &str) -> Language {
    let c = code;
    if c.contains("fn ") && c.contains("->") || c.contains("impl ") || c.contains("let mut ") {
        Language::Rust
    } else if c.contains("func ") && c.contains("package ") {
        Language::Go
    } else if c.contains("def ") && c.contains(':') && !c.contains(';') {
        Language::Python
    } else if c.contains("public class") || c.contains("private ") && c.contains(';') {
        Language::Java
    } else if c.contains("namespace ") && c.contains("using ") {
        Language::Csharp
    } else if c.contains("interface ") && (c.contains(": ") || c.contains("=>")) && c.contains("const ") {
        Language::Typescript
    } else if c.contains("function ") || c.contains("const ") || c.contains("=>") {
        Language::Javascript
    } else if c.contains("#include") && c.contains("std::") {
        Language::Cpp
    } else if c.contains("#include") {
        Language::C
    } else {
        Language::Unknown
    }
}

/// Cyclomatic complexity proxy: one plus the count of branching keywords.
pub fn cyclomatic_complexity(code: &str) -> u32 {
    let keywords = [
        "if ", "if(", "else if", "for ", "for(", "while ", "while(", "case ", "catch ", "&&", "||",
        "?",
    ];
    1 + keywords
        .iter()
        .map(|k| code.matches(k).count() as u32)
        .sum::<u32>()
}

/// Maximum brace/indent nesting depth, counting `{`/`}` pairs.
pub fn max_nesting_depth(code: &str) -> u32 {
    let mut depth: i32 = 0;
    let mut max_depth: i32 = 0;
    for ch in code.chars() {
        match ch {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    max_depth.max(0) as u32
}

/// Complexity bucket derived from cyclomatic complexity and nesting depth.
pub fn classify_complexity(cyclomatic: u32, nesting: u32) -> Complexity {
    if cyclomatic <= 3 && nesting <= 2 {
        Complexity::Low
    } else if cyclomatic <= 10 && nesting <= 4 {
        Complexity::Medium
    } else {
        Complexity::High
    }
}

/// `1 − min(1, nonBlankLines/200)·0.5 − min(1, cyclomaticComplexity/20)·0.5`.
pub fn simplicity_score(code: &str) -> f64 {
    let non_blank = code.lines().filter(|l| !l.trim().is_empty()).count() as f64;
    let cyclomatic = cyclomatic_complexity(code) as f64;
    let line_penalty = (non_blank / 200.0).min(1.0) * 0.5;
    let complexity_penalty = (cyclomatic / 20.0).min(1.0) * 0.5;
    (1.0 - line_penalty - complexity_penalty).max(0.0)
}

/// `1 − min(1, maxNestingDepth/6)`.
pub fn nesting_score(code: &str) -> f64 {
    let depth = max_nesting_depth(code) as f64;
    (1.0 - (depth / 6.0).min(1.0)).max(0.0)
}

/// Fraction of meaningful (non-blank) lines that carry a comment marker,
/// blended with an identifier-length heuristic that rewards names over
/// two characters.
pub fn clarity_score(code: &str) -> f64 {
    let comment_markers = ["//", "#", "/*", "\"\"\""];
    let meaningful: Vec<&str> = code.lines().filter(|l| !l.trim().is_empty()).collect();
    if meaningful.is_empty() {
        return 0.5;
    }
    let commented = meaningful
        .iter()
        .filter(|l| comment_markers.iter().any(|m| l.contains(m)))
        .count() as f64;
    let comment_ratio = (commented / meaningful.len() as f64).min(1.0);

    let identifiers: Vec<&str> = code
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|tok| !tok.is_empty() && tok.chars().next().unwrap().is_alphabetic())
        .collect();
    let long_identifiers = identifiers.iter().filter(|i| i.len() > 2).count() as f64;
    let identifier_ratio = if identifiers.is_empty() {
        0.5
    } else {
        long_identifiers / identifiers.len() as f64
    };

    (comment_ratio * 0.5 + identifier_ratio * 0.5).clamp(0.0, 1.0)
}

/// Cosine similarity of the code's token bag against the description's
/// token bag; `0.5` when no description is given.
pub fn relevance_score(code: &str, description: &str) -> f64 {
    if description.trim().is_empty() {
        return 0.5;
    }
    let code_tokens = token_bag(code);
    let desc_tokens = token_bag(description);
    if code_tokens.is_empty() || desc_tokens.is_empty() {
        return 0.5;
    }
    let intersection = code_tokens.intersection(&desc_tokens).count() as f64;
    let denom = (code_tokens.len() as f64).sqrt() * (desc_tokens.len() as f64).sqrt();
    if denom == 0.0 {
        0.5
    } else {
        (intersection / denom).clamp(0.0, 1.0)
    }
}

fn token_bag(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}
