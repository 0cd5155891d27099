//! Structural rule matching over compiled JVM class metadata.
//!
//! Build-time shrinkers rename the classes an integration depends on, so a
//! hardcoded name stops working on the next release of the target app. This
//! crate locates the renamed classes instead: a [`rule::RuleSet`] describes
//! each needed class by its structure (kind, fields, methods, enum constants,
//! referenced string literals), a [`container::Container`] parses the class
//! entries of a zip/JAR package, and the [`matcher::Matcher`] scans them
//! until every rule is resolved to a real qualified name. The resulting
//! mapping is cheap to reuse: [`cache::AdaptationCache`] persists it keyed by
//! app version and rule fingerprint, and only rescans when either changes.

pub mod cache;
pub mod container;
pub mod descriptor;
pub mod ir;
pub mod matcher;
mod opcodes;
pub mod rule;
pub mod strings;
