/**
 * Covenant Check
 *
 * DESIGN DECISION: Fixed predicate list over source text, each predicate
 * independently returning a severity
 * WHY: Patterns teach developers how to code; an insecure pattern doesn't
 * just fail once, it gets copied into every codebase that pulls it. Zero
 * tolerance for critical findings, configurable tolerance for high ones.
 *
 * REASONING CHAIN:
 * 1. Every predicate scans the combined name+description+code text once
 * 2. Predicates return zero or more violations, each carrying a severity
 * 3. Sealed = no critical violation fired
 * 4. Strict mode additionally requires no high violation
 *
 * PATTERN: Predicate-list security scanner (same shape as the validation
 * scanner this module generalizes from a pattern-quality gate to a
 * pre-insertion covenant gate)
 */

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub predicate: String,
    pub severity: ViolationSeverity,
    pub message: String,
}

fn catastrophic_regex_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((?:\.\*|\.\+)\)\+").expect("static regex"))
}

/// Runs the fixed predicate list against `text` (name + description + code
/// concatenated by the caller) and returns every violation found.
pub fn check(text: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    violations.extend(check_injection_assembly(text));
    violations.extend(check_malware_vectors(text));
    violations.extend(check_shell_backdoors(text));
    violations.extend(check_hardcoded_secrets(text));
    violations.extend(check_deprecated_crypto(text));
    violations.extend(check_catastrophic_regex(text));
    violations
}

/// `true` when no critical violation fired (and, in strict mode, no high
/// violation either).
pub fn is_sealed(violations: &[Violation], strict: bool) -> bool {
    let has_critical = violations
        .iter()
        .any(|v| v.severity == ViolationSeverity::Critical);
    if has_critical {
        return false;
    }
    if strict {
        return !violations
            .iter()
            .any(|v| v.severity == ViolationSeverity::High);
    }
    true
}

fn check_injection_assembly(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    let sql_concat = (text.contains("SELECT") || text.contains("INSERT") || text.contains("UPDATE"))
        && (text.contains("\" +") || text.contains("+ \"") || text.contains("${"))
        && !text.contains('?')
        && !text.contains('$');
    if sql_concat {
        out.push(Violation {
            predicate: "injection-assembly".to_string(),
            severity: ViolationSeverity::Critical,
            message: "query string assembled by concatenation rather than parameterization"
                .to_string(),
        });
    }
    out
}

fn check_malware_vectors(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    let decode_then_eval = (text.contains("base64") || text.contains("atob("))
        && (text.contains("eval(") || text.contains("exec(") || text.contains("Function("));
    if decode_then_eval {
        out.push(Violation {
            predicate: "malware-vector".to_string(),
            severity: ViolationSeverity::Critical,
            message: "decodes a payload and evaluates it as code".to_string(),
        });
    }
    out
}

fn check_shell_backdoors(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    let shell_with_input = (text.contains("exec(")
        || text.contains("system(")
        || text.contains("spawn(")
        || text.contains("shell=True"))
        && (text.contains("input") || text.contains("user") || text.contains("request"));
    if shell_with_input {
        out.push(Violation {
            predicate: "shell-backdoor".to_string(),
            severity: ViolationSeverity::Critical,
            message: "shell command built from untrusted input".to_string(),
        });
    }
    out
}

fn check_hardcoded_secrets(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    let markers = [
        "password = \"",
        "password=\"",
        "apikey = \"",
        "apiKey = \"",
        "api_key = \"",
        "secret = \"",
        "token = \"",
    ];
    for marker in markers {
        if text.contains(marker) {
            out.push(Violation {
                predicate: "hardcoded-secret".to_string(),
                severity: ViolationSeverity::Critical,
                message: "high-entropy literal assigned next to a credential identifier"
                    .to_string(),
            });
            break;
        }
    }
    out
}

fn check_deprecated_crypto(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    let weak_near_password = text.contains("password")
        && (text.contains("MD5") || text.contains("md5(") || text.contains("SHA1") || text.contains("sha1("));
    if weak_near_password {
        out.push(Violation {
            predicate: "deprecated-crypto".to_string(),
            severity: ViolationSeverity::High,
            message: "password hashed with a deprecated, unsalted digest".to_string(),
        });
    }
    out
}

fn check_catastrophic_regex(text: &str) -> Vec<Violation> {
    let mut out = Vec::new();
    if catastrophic_regex_pattern().is_match(text) {
        out.push(Violation {
            predicate: "catastrophic-regex".to_string(),
            severity: ViolationSeverity::High,
            message: "nested quantifier is vulnerable to catastrophic backtracking".to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_seals() {
        let violations = check("fn add(a: i32, b: i32) -> i32 { a + b }");
        assert!(violations.is_empty());
        assert!(is_sealed(&violations, false));
    }

    #[test]
    fn test_sql_concatenation_blocks() {
        let violations = check("let q = \"SELECT * FROM users WHERE name = \" + name;");
        assert!(violations
            .iter()
            .any(|v| v.predicate == "injection-assembly" && v.severity == ViolationSeverity::Critical));
        assert!(!is_sealed(&violations, false));
    }

    #[test]
    fn test_hardcoded_secret_blocks() {
        let violations = check("let token = \"sk-live-abc123\";\npassword = \"hunter2\"");
        assert!(!is_sealed(&violations, false));
    }

    #[test]
    fn test_catastrophic_regex_high_blocks_only_in_strict() {
        let violations = check("let re = Regex::new(r\"(a+)+\").unwrap();");
        assert!(is_sealed(&violations, false));
        assert!(!is_sealed(&violations, true));
    }

    #[test]
    fn test_decode_then_eval_blocks() {
        let violations = check("eval(atob(payload))");
        assert!(violations
            .iter()
            .any(|v| v.predicate == "malware-vector"));
        assert!(!is_sealed(&violations, false));
    }
}
