//! Built-in sanitizer rule table.
//!
//! Rules run top to bottom. Categories are grouped so markup is neutralised
//! before injection and PII patterns look at the text.

use super::{RuleAction, RuleCategory, SanitizerPolicy};

/// Where a built-in rule takes its action from.
#[derive(Debug, Clone, Copy)]
pub(super) enum ActionSource {
    /// Always applied with this action.
    Fixed(RuleAction),
    DynamicExecution,
    Pii,
    Encoded,
    ControlCharacters,
}

impl ActionSource {
    pub(super) fn resolve(self, policy: &SanitizerPolicy) -> RuleAction {
        match self {
            ActionSource::Fixed(action) => action,
            ActionSource::DynamicExecution => policy.dynamic_execution,
            ActionSource::Pii => policy.pii,
            ActionSource::Encoded => policy.encoded,
            ActionSource::ControlCharacters => policy.control_characters,
        }
    }
}

/// Static description of a built-in rule.
pub(super) struct RuleSpec {
    pub(super) name: &'static str,
    pub(super) category: RuleCategory,
    pub(super) pattern: &'static str,
    pub(super) action: ActionSource,
}

const REDACT: ActionSource = ActionSource::Fixed(RuleAction::Redact);
const STRIP: ActionSource = ActionSource::Fixed(RuleAction::Strip);

pub(super) const BUILTIN_RULES: &[RuleSpec] = &[
    // Markup
    RuleSpec {
        name: "script_block",
        category: RuleCategory::Markup,
        pattern: r"(?is)<script\b[^>]*>.*?</script\s*>",
        action: REDACT,
    },
    RuleSpec {
        name: "script_tag",
        category: RuleCategory::Markup,
        pattern: r"(?i)</?script\b[^>]*>?",
        action: REDACT,
    },
    RuleSpec {
        name: "javascript_uri",
        category: RuleCategory::Markup,
        pattern: r"(?i)javascript\s*:",
        action: REDACT,
    },
    RuleSpec {
        name: "event_handler",
        category: RuleCategory::Markup,
        pattern: r#"(?i)\bon[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#,
        action: REDACT,
    },
    RuleSpec {
        name: "angle_brackets",
        category: RuleCategory::Markup,
        pattern: r"[<>]",
        action: STRIP,
    },
    // SQL injection
    RuleSpec {
        name: "drop_table",
        category: RuleCategory::SqlInjection,
        pattern: r"(?i)\bdrop\s+table\b",
        action: REDACT,
    },
    RuleSpec {
        name: "sql_tautology",
        category: RuleCategory::SqlInjection,
        pattern: r"(?i)'\s*or\s+'?\w+'?\s*=\s*'?\w+'?",
        action: REDACT,
    },
    RuleSpec {
        name: "union_select",
        category: RuleCategory::SqlInjection,
        pattern: r"(?i)\bunion\s+(?:all\s+)?select\b",
        action: REDACT,
    },
    RuleSpec {
        name: "sql_comment",
        category: RuleCategory::SqlInjection,
        pattern: r"--|/\*|\*/",
        action: REDACT,
    },
    // Command injection
    RuleSpec {
        name: "recursive_delete",
        category: RuleCategory::CommandInjection,
        pattern: r"(?i)(?:(?:;|&&|\|\|)\s*)?\brm\s+-(?:rf|fr)\b",
        action: REDACT,
    },
    RuleSpec {
        name: "backtick_span",
        category: RuleCategory::CommandInjection,
        pattern: r"`[^`]*`",
        action: REDACT,
    },
    RuleSpec {
        name: "backtick",
        category: RuleCategory::CommandInjection,
        pattern: r"`",
        action: STRIP,
    },
    RuleSpec {
        name: "pipe_to_shell",
        category: RuleCategory::CommandInjection,
        pattern: r"(?i)\|\s*(?:ba|z|k|c|da)?sh\b",
        action: REDACT,
    },
    RuleSpec {
        name: "command_substitution",
        category: RuleCategory::CommandInjection,
        pattern: r"\$\(",
        action: REDACT,
    },
    // Dynamic execution
    RuleSpec {
        name: "eval_call",
        category: RuleCategory::DynamicExecution,
        pattern: r"(?i)\beval\s*\(",
        action: ActionSource::DynamicExecution,
    },
    RuleSpec {
        name: "function_constructor",
        category: RuleCategory::DynamicExecution,
        pattern: r"(?i)\bnew\s+Function\s*\(",
        action: ActionSource::DynamicExecution,
    },
    RuleSpec {
        name: "timer_call",
        category: RuleCategory::DynamicExecution,
        pattern: r"(?i)\bset(?:Timeout|Interval)\s*\(",
        action: ActionSource::DynamicExecution,
    },
    // PII
    RuleSpec {
        name: "ssn",
        category: RuleCategory::Pii,
        pattern: r"\b\d{3}-\d{2}-\d{4}\b",
        action: ActionSource::Pii,
    },
    RuleSpec {
        name: "card_number",
        category: RuleCategory::Pii,
        pattern: r"\b(?:\d{4}[ -]?){3}\d{4}\b",
        action: ActionSource::Pii,
    },
    RuleSpec {
        name: "email",
        category: RuleCategory::Pii,
        pattern: r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
        action: ActionSource::Pii,
    },
    RuleSpec {
        name: "phone_number",
        category: RuleCategory::Pii,
        pattern: r"(?:\+?1[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]\d{4}\b",
        action: ActionSource::Pii,
    },
    RuleSpec {
        name: "street_address",
        category: RuleCategory::Pii,
        pattern: r"(?i)\b\d{1,5}\s+(?:[a-z0-9]+\s+){1,4}(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|court|ct|way)\b",
        action: ActionSource::Pii,
    },
    RuleSpec {
        name: "password_literal",
        category: RuleCategory::Pii,
        pattern: r"(?i)password",
        action: ActionSource::Pii,
    },
    RuleSpec {
        name: "token_literal",
        category: RuleCategory::Pii,
        pattern: r"(?i)token:",
        action: ActionSource::Pii,
    },
    // Encoding
    RuleSpec {
        name: "control_characters",
        category: RuleCategory::Encoding,
        pattern: r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]",
        action: ActionSource::ControlCharacters,
    },
    RuleSpec {
        name: "percent_encoded_markup",
        category: RuleCategory::Encoding,
        pattern: r"(?i)%3[ce]",
        action: ActionSource::Encoded,
    },
    RuleSpec {
        name: "html_entity_markup",
        category: RuleCategory::Encoding,
        pattern: r"(?i)&(?:lt|gt|#0*6[02]|#x0*3[ce]);",
        action: ActionSource::Encoded,
    },
    RuleSpec {
        name: "unicode_escape_markup",
        category: RuleCategory::Encoding,
        pattern: r"(?i)\\u003[ce]|\\x3[ce]",
        action: ActionSource::Encoded,
    },
];
