//! Render-time redaction of credentials in log text.
//!
//! Two kinds of secrets are masked:
//!
//! - API keys written as `api_key=<token>`: everything but the last five
//!   characters of the token is replaced by a fixed run of `*`.
//! - Literal values registered at runtime via [`register_for_redaction`],
//!   replaced by `[REDACTED]`.
//!
//! [`redact`] applies both and is what the logging pipeline calls on every
//! rendered line (see [`crate::writer`]).

use aho_corasick::{AhoCorasick, MatchKind};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::borrow::Cow;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Matches `api_key=` followed by a word token, capturing its last five characters.
pub const API_KEY_PATTERN: &str = r"api_key=+\w+(\w{5})";

/// Fixed-length mask. `*` is outside `\w`, so masked output never matches again.
pub const API_KEY_MASK: &str = "*************************";

/// Replacement for registered literal secrets.
pub const REDACTED: &str = "[REDACTED]";

static API_KEY_RULE: Lazy<RedactionRule> = Lazy::new(|| RedactionRule {
    pattern: Regex::new(API_KEY_PATTERN).expect("API key pattern is a valid regex"),
    replacement: format!("api_key={API_KEY_MASK}${{1}}"),
});

/// A compiled pattern and the replacement template applied to its matches.
///
/// Replacement templates use `regex` expansion syntax (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct RedactionRule {
    pattern: Regex,
    replacement: String,
}

impl RedactionRule {
    /// Compile a new rule.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// The built-in API key rule.
    pub fn api_key() -> &'static RedactionRule {
        &API_KEY_RULE
    }

    /// Replace every match in `input`. Borrows the input untouched when nothing matches.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, self.replacement.as_str())
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// An ordered list of rules applied one after another.
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
}

impl Redactor {
    /// A redactor with no rules; it passes every input through.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: RedactionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RedactionRule] {
        &self.rules
    }

    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut output = Cow::Borrowed(input);
        for rule in &self.rules {
            let replaced = match rule.apply(&output) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                output = Cow::Owned(s);
            }
        }
        output
    }
}

impl Default for Redactor {
    /// The API key rule only.
    fn default() -> Self {
        Self::new().with_rule(RedactionRule::api_key().clone())
    }
}

/// Mask API keys in `input`.
pub fn redact_api_keys(input: &str) -> Cow<'_, str> {
    API_KEY_RULE.apply(input)
}

// Global singleton for tracking secrets that need redaction
static REDACTION_REGISTRY: Lazy<DashMap<String, ()>> = Lazy::new(DashMap::new);

// Automaton over the registry, rebuilt whenever a secret is added
static REGISTERED_MATCHER: Lazy<RwLock<Option<Arc<AhoCorasick>>>> =
    Lazy::new(|| RwLock::new(None));

/// Registers a literal secret value for redaction
pub fn register_for_redaction(secret_value: &str) {
    if secret_value.is_empty() {
        return;
    }
    if REDACTION_REGISTRY
        .insert(secret_value.to_string(), ())
        .is_some()
    {
        return;
    }

    // The lock must be released before logging: the writer reads it on every line.
    let built = {
        let mut matcher = REGISTERED_MATCHER
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let secrets: Vec<String> = REDACTION_REGISTRY
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        // On failure the previous automaton stays in place
        AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&secrets)
            .map(|ac| {
                *matcher = Some(Arc::new(ac));
                secrets.len()
            })
    };

    match built {
        Ok(count) => debug!(count, "Registered secret value for redaction"),
        Err(e) => error!("Failed to build redaction automaton: {}", e),
    }
}

/// Registers a secret for redaction via Secret wrapper
pub fn register_secret_for_redaction(secret: &SecretString) {
    register_for_redaction(secret.expose_secret());
}

/// Register a secret for redaction and hand it back.
pub fn with_redaction(secret: SecretString) -> SecretString {
    register_secret_for_redaction(&secret);
    secret
}

/// Mask every registered literal secret in `input`.
pub fn redact_registered(input: &str) -> Cow<'_, str> {
    let matcher = REGISTERED_MATCHER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    match matcher {
        Some(ac) if ac.is_match(input) => {
            let replacements = vec![REDACTED; ac.patterns_len()];
            Cow::Owned(ac.replace_all(input, &replacements))
        }
        _ => Cow::Borrowed(input),
    }
}

/// Redacts registered secrets and API keys from a rendered message.
pub fn redact(input: &str) -> Cow<'_, str> {
    match redact_registered(input) {
        Cow::Borrowed(s) => redact_api_keys(s),
        Cow::Owned(s) => {
            let masked = match redact_api_keys(&s) {
                Cow::Owned(m) => Some(m),
                Cow::Borrowed(_) => None,
            };
            Cow::Owned(masked.unwrap_or(s))
        }
    }
}

#[cfg(test)]
pub(crate) fn is_registered_for_redaction(key: &str) -> bool {
    REDACTION_REGISTRY.contains_key(key)
}
