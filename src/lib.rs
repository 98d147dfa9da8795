//! Conn Rewriter: one-shot migration of raw `MongoClient` connections
//!
//! Rewrites a single route module so that every request handler obtains its
//! database handle from the shared `getDatabase()` helper instead of opening
//! and closing its own `MongoClient`.
//!
//! # Architecture
//!
//! The file is read whole, run through an ordered [`RuleSet`] of
//! [`SubstitutionRule`]s (each over the previous rule's output), and written
//! back in place. No parsing happens; the text is opaque.
//!
//! - [`rule`]: literal and regex substitution rules
//! - [`migration`]: the fixed three-rule migration
//! - [`rewrite`]: file I/O around a rule set
//!
//! # Safety
//!
//! - Atomic file writes (tempfile + fsync + rename)
//! - xxh3 re-check of the file right before writing
//! - UTF-8 validation on read
//! - Idempotent: migrated text is a fixed point of the rule set
//!
//! # Example
//!
//! ```no_run
//! use conn_rewriter::{database_helper_rules, rewrite_file};
//!
//! match rewrite_file("src/routes/users.ts", database_helper_rules()) {
//!     Ok(report) => println!("Rewrite finished: {:?}", report.outcome),
//!     Err(e) => eprintln!("Rewrite failed: {}", e),
//! }
//! ```

pub mod migration;
pub mod rewrite;
pub mod rule;

// Re-exports
pub use migration::{database_helper_rules, migrate_text, DEFAULT_TARGET};
pub use rewrite::{rewrite_file, RewriteError, RewriteOutcome, RewriteReport, Rewriter};
pub use rule::{
    Pattern, Replacement, RuleError, RuleReport, RuleSet, SubstitutionRule, Transform,
};
