use regex::{Regex, RegexBuilder};

/// Phrase rules run first, keeping the lead-in and replacing what follows.
const PHRASE_RULES: &[(&str, &str)] = &[
    (r"(my name is|I am) (\w+)", "${1} [REDACTED_NAME]"),
    (r"(my address is) (.*)", "${1} [REDACTED_ADDRESS]"),
    (r"(my ssn is) (.*)", "${1} [REDACTED_SSN]"),
];

const PATTERNS: &[(&str, &str)] = &[
    ("EMAIL", r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"),
    ("SSN", r"\b\d{3}[-.\s]?\d{2}[-.\s]?\d{4}\b"),
    ("PHONE", r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b"),
    ("DOB", r"\b\d{1,4}[-/.]\d{1,2}[-/.]\d{2,4}\b"),
];

pub trait Redactor: Send + Sync {
    fn redact(&self, text: &str) -> String;
}

#[derive(Clone, Debug)]
pub struct PatternRedactor {
    rules: Vec<(Regex, &'static str)>,
    patterns: Vec<(Regex, String)>,
}

impl PatternRedactor {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = PHRASE_RULES
            .iter()
            .map(|(pattern, replacement)| -> Result<_, regex::Error> {
                Ok((case_insensitive(pattern)?, *replacement))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let patterns = PATTERNS
            .iter()
            .map(|(kind, pattern)| -> Result<_, regex::Error> {
                Ok((case_insensitive(pattern)?, format!("[REDACTED_{kind}]")))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules, patterns })
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl Redactor for PatternRedactor {
    fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for (pattern, replacement) in &self.rules {
            redacted = pattern.replace_all(&redacted, *replacement).into_owned();
        }
        for (pattern, replacement) in &self.patterns {
            redacted = pattern.replace_all(&redacted, regex::NoExpand(replacement)).into_owned();
        }
        redacted
    }
}
