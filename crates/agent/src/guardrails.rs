use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

const JAILBREAK_PATTERNS: &[&str] = &[
    r"ignore the above instructions",
    r"pretend to be",
    r"act as if",
    r"override your ethical guidelines",
];

const OUT_OF_SCOPE_PATTERNS: &[&str] = &[
    r"write a story",
    r"write a poem",
    r"write an essay",
    r"political opinion",
    r"stock market",
    r"weather forecast",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Jailbreak,
    Scope,
}

impl RejectionReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Jailbreak => "jailbreak",
            Self::Scope => "scope",
        }
    }

    pub fn refusal_message(&self) -> &'static str {
        match self {
            Self::Jailbreak => {
                "I cannot process that request. My program prevents me from overriding my core \
                 instructions or ethical guidelines."
            }
            Self::Scope => {
                "I am a specialized health data analysis tool and can only answer questions \
                 related to the provided health metrics and data analysis. Please ask a \
                 data-related question."
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeVerdict {
    Allow,
    Reject(RejectionReason),
}

pub trait ScopeFilter: Send + Sync {
    fn check(&self, query: &str) -> ScopeVerdict;
}

/// Case-insensitive phrase filter; jailbreak phrases are checked before scope phrases.
#[derive(Clone, Debug)]
pub struct KeywordScopeFilter {
    jailbreak: Vec<Regex>,
    out_of_scope: Vec<Regex>,
}

impl KeywordScopeFilter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            jailbreak: compile(JAILBREAK_PATTERNS)?,
            out_of_scope: compile(OUT_OF_SCOPE_PATTERNS)?,
        })
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
        .collect()
}

impl ScopeFilter for KeywordScopeFilter {
    fn check(&self, query: &str) -> ScopeVerdict {
        if self.jailbreak.iter().any(|pattern| pattern.is_match(query)) {
            return ScopeVerdict::Reject(RejectionReason::Jailbreak);
        }
        if self.out_of_scope.iter().any(|pattern| pattern.is_match(query)) {
            return ScopeVerdict::Reject(RejectionReason::Scope);
        }
        ScopeVerdict::Allow
    }
}
