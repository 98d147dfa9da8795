//! The fixed rule set migrating a route module from per-request
//! `MongoClient.connect` clients to the shared `getDatabase()` helper.
//!
//! Rules, in order:
//! 1. `await getDb()` becomes `await getDatabase()` (literal).
//! 2. `const client = await MongoClient.connect(MONGODB_URI)` immediately
//!    followed by `const db = client.db()` collapses to
//!    `const db = await getDatabase()`.
//! 3. `await client.close()` and the whitespace around it collapse to a
//!    single line break (`\r\n` when the match spans one, else `\n`).

use crate::rule::{Pattern, Replacement, RuleSet, SubstitutionRule};
use once_cell::sync::Lazy;
use regex::Regex;

/// Target used when no path is given on the command line.
pub const DEFAULT_TARGET: &str = "src/routes/users.ts";

pub const GET_DB_CALL: &str = "await getDb()";
pub const GET_DATABASE_CALL: &str = "await getDatabase()";
pub const DATABASE_HELPER_LINE: &str = "const db = await getDatabase()";

pub const RULE_GET_DB_CALL: &str = "replace-get-db-call";
pub const RULE_CLIENT_CONNECT: &str = "collapse-client-connect";
pub const RULE_CLIENT_CLOSE: &str = "drop-client-close";

// `\s` matches newlines: the gap between the two statements is consumed, the
// first statement's indentation is not.
const CLIENT_CONNECT_PATTERN: &str = r"const\s+client\s*=\s*await\s+MongoClient\.connect\(\s*MONGODB_URI\s*\)\s*;?\s+const\s+db\s*=\s*client\.db\(\s*\)";

// Surrounding whitespace on both sides belongs to the match.
const CLIENT_CLOSE_PATTERN: &str = r"\s*await\s+client\.close\(\s*\)\s*;?\s*";

static CLIENT_CONNECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(CLIENT_CONNECT_PATTERN).expect("client connect pattern is valid"));

static CLIENT_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(CLIENT_CLOSE_PATTERN).expect("client close pattern is valid"));

static RULES: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new()
        .with(SubstitutionRule {
            id: RULE_GET_DB_CALL.to_string(),
            pattern: Pattern::Literal(GET_DB_CALL.to_string()),
            replacement: Replacement::from(GET_DATABASE_CALL),
        })
        .with(SubstitutionRule::with_regex(
            RULE_CLIENT_CONNECT,
            CLIENT_CONNECT_RE.clone(),
            DATABASE_HELPER_LINE,
        ))
        .with(SubstitutionRule::with_regex(
            RULE_CLIENT_CLOSE,
            CLIENT_CLOSE_RE.clone(),
            Replacement::LineBreak,
        ))
});

/// The three migration rules in application order.
pub fn database_helper_rules() -> &'static RuleSet {
    &RULES
}

/// Apply the migration to an in-memory string.
pub fn migrate_text(text: &str) -> String {
    database_helper_rules().apply(text).text
}
