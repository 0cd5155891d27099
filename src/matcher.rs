//! Structural matching of class rules against parsed modules.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;

use crate::ir::{ClassDef, MethodDef, Module};
use crate::rule::{ClassKind, ClassRule, FieldSig, MethodSig, RuleSet, set};

/// Mapping from logical rule names to resolved qualified class names.
pub type ResolutionMap = BTreeMap<String, String>;

/// Capability for checking that a resolved name is loadable by the consumer's
/// runtime. An unresolvable name is a normal outcome, never an error; the
/// rule is simply skipped for that candidate class.
pub trait Binder {
    fn bind(&self, qualified_name: &str) -> bool;
}

/// Binder that accepts every name; matching then relies on the parsed
/// metadata alone.
pub struct AlwaysBinds;

impl Binder for AlwaysBinds {
    fn bind(&self, _qualified_name: &str) -> bool {
        true
    }
}

static ALWAYS_BINDS: AlwaysBinds = AlwaysBinds;

/// Scans class definitions until every rule has a match or input runs out.
pub struct Matcher<'a> {
    rules: &'a RuleSet,
    binder: &'a dyn Binder,
    progress: Option<&'a dyn Fn(usize, usize, &str)>,
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules,
            binder: &ALWAYS_BINDS,
            progress: None,
        }
    }

    pub fn with_binder(mut self, binder: &'a dyn Binder) -> Self {
        self.binder = binder;
        self
    }

    /// Report `(found, total, logical_name)` after each recorded match.
    pub fn with_progress(mut self, progress: &'a dyn Fn(usize, usize, &str)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the scan. The result may be partial; the caller decides success
    /// by comparing its size against the rule count. Once every rule has a
    /// match no further module is taken from the iterator.
    pub fn scan(
        &self,
        modules: impl IntoIterator<Item = Result<Module>>,
    ) -> Result<ResolutionMap> {
        let total = self.rules.len();
        let mut results = ResolutionMap::new();
        if total == 0 {
            return Ok(results);
        }

        let name_patterns = self.compile_name_patterns()?;

        // Check completeness before pulling the next module so a finished
        // scan never reads or parses another entry.
        let mut modules = modules.into_iter();
        while results.len() < total {
            let Some(module) = modules.next() else {
                break;
            };
            let module = module?;
            for class in &module.classes {
                if results.len() == total {
                    return Ok(results);
                }
                for (rule, name_pattern) in self.rules.iter().zip(&name_patterns) {
                    if results.contains_key(&rule.name) {
                        continue;
                    }
                    if !self.rule_matches(rule, name_pattern.as_ref(), class)? {
                        continue;
                    }
                    // First match wins; the rule is never revisited.
                    results.insert(rule.name.clone(), class.qualified_name.clone());
                    if let Some(progress) = self.progress {
                        progress(results.len(), total, &rule.name);
                    }
                }
            }
        }

        Ok(results)
    }

    fn rule_matches(
        &self,
        rule: &ClassRule,
        name_pattern: Option<&Regex>,
        class: &ClassDef,
    ) -> Result<bool> {
        if let Some(pattern) = name_pattern {
            if !pattern.is_match(&class.qualified_name) {
                return Ok(false);
            }
        }
        if !self.binder.bind(&class.qualified_name) {
            return Ok(false);
        }
        if !rule.kind.admits(class) {
            return Ok(false);
        }

        // Enum rules are decided by constant names alone.
        if rule.kind == ClassKind::Enum {
            return Ok(enum_constants_match(&rule.fields, class));
        }

        if !fields_match(&rule.fields, class) {
            return Ok(false);
        }
        if !literals_present(&rule.strings, &class.strings) {
            return Ok(false);
        }
        methods_match(&rule.methods, class)
    }

    fn compile_name_patterns(&self) -> Result<Vec<Option<Regex>>> {
        self.rules
            .iter()
            .map(|rule| {
                set(&rule.name_pattern)
                    .map(|pattern| {
                        compile_full(pattern)
                            .with_context(|| format!("invalid name pattern for rule {}", rule.name))
                    })
                    .transpose()
            })
            .collect()
    }
}

/// Compile a pattern that must match its whole input.
fn compile_full(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

fn enum_constants_match(required: &[FieldSig], class: &ClassDef) -> bool {
    required.iter().all(|sig| {
        set(&sig.name).is_some_and(|name| {
            class
                .enum_constants
                .iter()
                .any(|constant| constant == name)
        })
    })
}

fn fields_match(required: &[FieldSig], class: &ClassDef) -> bool {
    required.iter().all(|sig| {
        class.fields.iter().any(|field| {
            let name = set(&sig.name);
            let type_name = set(&sig.type_name);
            if name.is_none() && type_name.is_none() {
                // A signature with no condition never matches anything.
                return false;
            }
            name.is_none_or(|name| name == field.name)
                && type_name.is_none_or(|type_name| type_name == field.type_name)
        })
    })
}

fn methods_match(required: &[MethodSig], class: &ClassDef) -> Result<bool> {
    for sig in required {
        let mut satisfied = false;
        for method in &class.methods {
            if method_sig_matches(sig, method)? {
                satisfied = true;
                break;
            }
        }
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn method_sig_matches(sig: &MethodSig, method: &MethodDef) -> Result<bool> {
    if sig.is_vacuous() {
        return Ok(false);
    }

    // Constructors carry no usable name or return type; the parameter list
    // is the whole signature.
    if set(&sig.name) == Some("constructor") {
        return Ok(method.name == "<init>" && parameters_match(&sig.parameters, method));
    }

    if let Some(name) = set(&sig.name) {
        if name != method.name {
            return Ok(false);
        }
    }
    if let Some(pattern) = set(&sig.name_pattern) {
        let pattern = compile_full(pattern)
            .with_context(|| format!("invalid method name pattern {pattern}"))?;
        if !pattern.is_match(&method.name) {
            return Ok(false);
        }
    }
    if let Some(return_type) = set(&sig.return_type) {
        if return_type != method.return_type {
            return Ok(false);
        }
    }
    if let Some(modifiers) = set(&sig.modifiers) {
        if modifiers != method.modifiers {
            return Ok(false);
        }
    }
    if !parameters_match(&sig.parameters, method) {
        return Ok(false);
    }
    Ok(literals_present(&sig.strings, &method.strings))
}

/// An empty required list leaves the arity unconstrained; a non-empty one
/// demands exact arity and positional type equality.
fn parameters_match(required: &[FieldSig], method: &MethodDef) -> bool {
    if required.is_empty() {
        return true;
    }
    if method.parameter_types.len() != required.len() {
        return false;
    }
    required
        .iter()
        .zip(&method.parameter_types)
        .all(|(sig, actual)| set(&sig.type_name).is_some_and(|expected| expected == actual))
}

fn literals_present(required: &[String], available: &[String]) -> bool {
    required.iter().all(|needle| available.contains(needle))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::ir::FieldDef;

    fn module(name: &str, classes: Vec<ClassDef>) -> Result<Module> {
        Ok(Module {
            name: name.to_string(),
            classes,
        })
    }

    fn class(qualified_name: &str) -> ClassDef {
        ClassDef {
            qualified_name: qualified_name.to_string(),
            ..ClassDef::default()
        }
    }

    fn method(name: &str, return_type: &str, parameter_types: &[&str]) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            return_type: return_type.to_string(),
            parameter_types: parameter_types.iter().map(|t| t.to_string()).collect(),
            modifiers: "public".to_string(),
            strings: Vec::new(),
        }
    }

    fn rule_set(rules: Vec<ClassRule>) -> RuleSet {
        RuleSet::new(rules).expect("rule set")
    }

    fn named_rule(name: &str) -> ClassRule {
        ClassRule {
            name: name.to_string(),
            ..ClassRule::default()
        }
    }

    #[test]
    fn vacuous_rule_matches_first_class() {
        let rules = rule_set(vec![named_rule("Anything")]);
        let modules = vec![
            module("a.class", vec![class("pkg.First")]),
            module("b.class", vec![class("pkg.Second")]),
        ];
        let results = Matcher::new(&rules).scan(modules).expect("scan");
        assert_eq!(results.get("Anything").map(String::as_str), Some("pkg.First"));
    }

    #[test]
    fn interface_rule_with_method_resolves_concrete_scenario() {
        let mut ifoo = class("pkg.IFoo");
        ifoo.is_interface = true;
        ifoo.methods.push(method("bar", "boolean", &[]));
        let baz = class("pkg.Baz");

        let rules = rule_set(vec![ClassRule {
            name: "Foo".to_string(),
            kind: ClassKind::Interface,
            methods: vec![MethodSig {
                name: Some("bar".to_string()),
                return_type: Some("boolean".to_string()),
                ..MethodSig::default()
            }],
            ..ClassRule::default()
        }]);

        let modules = vec![module("app.class", vec![baz, ifoo])];
        let results = Matcher::new(&rules).scan(modules).expect("scan");
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("Foo").map(String::as_str), Some("pkg.IFoo"));
    }

    #[test]
    fn unmatched_rule_yields_empty_map() {
        let rules = rule_set(vec![ClassRule {
            name: "Foo".to_string(),
            kind: ClassKind::Interface,
            methods: vec![MethodSig {
                name: Some("bar".to_string()),
                return_type: Some("boolean".to_string()),
                ..MethodSig::default()
            }],
            ..ClassRule::default()
        }]);
        let modules = vec![module("app.class", vec![class("pkg.Baz")])];
        let results = Matcher::new(&rules).scan(modules).expect("scan");
        assert!(results.is_empty());
    }

    #[test]
    fn class_kind_does_not_exclude_interfaces() {
        let mut iface = class("pkg.IFoo");
        iface.is_interface = true;
        let rules = rule_set(vec![ClassRule {
            name: "Loose".to_string(),
            kind: ClassKind::Class,
            ..ClassRule::default()
        }]);
        let modules = vec![module("app.class", vec![iface])];
        let results = Matcher::new(&rules).scan(modules).expect("scan");
        assert_eq!(results.get("Loose").map(String::as_str), Some("pkg.IFoo"));
    }

    #[test]
    fn enum_rule_requires_every_constant() {
        let mut status = class("pkg.Status");
        status.is_enum = true;
        status.enum_constants = vec!["OPEN".to_string(), "CLOSED".to_string()];

        let rule = |constants: &[&str]| {
            rule_set(vec![ClassRule {
                name: "Status".to_string(),
                kind: ClassKind::Enum,
                fields: constants
                    .iter()
                    .map(|name| FieldSig {
                        name: Some(name.to_string()),
                        ..FieldSig::default()
                    })
                    .collect(),
                ..ClassRule::default()
            }])
        };

        let hit = Matcher::new(&rule(&["OPEN", "CLOSED"]))
            .scan(vec![module("app.class", vec![status.clone()])])
            .expect("scan");
        assert_eq!(hit.len(), 1);

        let miss = Matcher::new(&rule(&["OPEN", "ARCHIVED"]))
            .scan(vec![module("app.class", vec![status])])
            .expect("scan");
        assert!(miss.is_empty());
    }

    #[test]
    fn enum_rule_rejects_non_enum_class() {
        let plain = class("pkg.Status");
        let rules = rule_set(vec![ClassRule {
            name: "Status".to_string(),
            kind: ClassKind::Enum,
            fields: vec![FieldSig {
                name: Some("OPEN".to_string()),
                ..FieldSig::default()
            }],
            ..ClassRule::default()
        }]);
        let results = Matcher::new(&rules)
            .scan(vec![module("app.class", vec![plain])])
            .expect("scan");
        assert!(results.is_empty());
    }

    #[test]
    fn vacuous_field_sig_never_matches() {
        let mut target = class("pkg.Target");
        target.fields.push(FieldDef {
            name: "count".to_string(),
            type_name: "int".to_string(),
        });
        let rules = rule_set(vec![ClassRule {
            name: "Target".to_string(),
            fields: vec![FieldSig::default()],
            ..ClassRule::default()
        }]);
        let results = Matcher::new(&rules)
            .scan(vec![module("app.class", vec![target])])
            .expect("scan");
        assert!(results.is_empty());
    }

    #[test]
    fn field_condition_scans_all_declared_fields() {
        let mut target = class("pkg.Target");
        target.fields.push(FieldDef {
            name: "first".to_string(),
            type_name: "int".to_string(),
        });
        target.fields.push(FieldDef {
            name: "second".to_string(),
            type_name: "java.lang.String".to_string(),
        });
        let rules = rule_set(vec![ClassRule {
            name: "Target".to_string(),
            fields: vec![FieldSig {
                type_name: Some("java.lang.String".to_string()),
                ..FieldSig::default()
            }],
            ..ClassRule::default()
        }]);
        let results = Matcher::new(&rules)
            .scan(vec![module("app.class", vec![target])])
            .expect("scan");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn name_pattern_must_cover_whole_name() {
        let rules = rule_set(vec![ClassRule {
            name: "Obfuscated".to_string(),
            name_pattern: Some(r"\w{1,2}\.\w+".to_string()),
            ..ClassRule::default()
        }]);
        let modules = vec![module(
            "app.class",
            vec![class("com.example.Book"), class("a.bc")],
        )];
        let results = Matcher::new(&rules).scan(modules).expect("scan");
        assert_eq!(results.get("Obfuscated").map(String::as_str), Some("a.bc"));
    }

    #[test]
    fn binder_rejection_skips_candidate_not_scan() {
        struct RejectFirst;
        impl Binder for RejectFirst {
            fn bind(&self, qualified_name: &str) -> bool {
                qualified_name != "pkg.First"
            }
        }

        let rules = rule_set(vec![named_rule("Anything")]);
        let modules = vec![module(
            "app.class",
            vec![class("pkg.First"), class("pkg.Second")],
        )];
        let results = Matcher::new(&rules)
            .with_binder(&RejectFirst)
            .scan(modules)
            .expect("scan");
        assert_eq!(
            results.get("Anything").map(String::as_str),
            Some("pkg.Second")
        );
    }

    #[test]
    fn stops_pulling_modules_once_all_rules_match() {
        let rules = rule_set(vec![named_rule("First"), named_rule("Second")]);
        let pulled = Cell::new(0usize);
        let modules = (0..10).map(|index| {
            pulled.set(pulled.get() + 1);
            module(&format!("m{index}.class"), vec![class(&format!("pkg.C{index}"))])
        });

        let results = Matcher::new(&rules).scan(modules).expect("scan");
        assert_eq!(results.len(), 2);
        // Both rules match pkg.C0; no further module may be pulled.
        assert_eq!(pulled.get(), 1);
    }

    #[test]
    fn first_match_wins_deterministically() {
        let rules = rule_set(vec![ClassRule {
            name: "Winner".to_string(),
            methods: vec![MethodSig {
                name: Some("run".to_string()),
                ..MethodSig::default()
            }],
            ..ClassRule::default()
        }]);
        let build = || {
            let mut early = class("pkg.Early");
            early.methods.push(method("run", "void", &[]));
            let mut late = class("pkg.Late");
            late.methods.push(method("run", "void", &[]));
            vec![
                module("a.class", vec![early]),
                module("b.class", vec![late]),
            ]
        };

        for _ in 0..3 {
            let results = Matcher::new(&rules).scan(build()).expect("scan");
            assert_eq!(results.get("Winner").map(String::as_str), Some("pkg.Early"));
        }
    }

    #[test]
    fn scan_is_idempotent() {
        let rules = rule_set(vec![named_rule("Anything")]);
        let build = || vec![module("a.class", vec![class("pkg.First")])];
        let first = Matcher::new(&rules).scan(build()).expect("scan");
        let second = Matcher::new(&rules).scan(build()).expect("scan");
        assert_eq!(
            serde_json::to_string(&first).expect("serialize"),
            serde_json::to_string(&second).expect("serialize")
        );
    }

    #[test]
    fn method_parameters_require_exact_arity() {
        let mut target = class("pkg.Books");
        target
            .methods
            .push(method("isFake", "boolean", &["com.example.Book", "int"]));

        let sig = |types: &[&str]| MethodSig {
            name: Some("isFake".to_string()),
            parameters: types
                .iter()
                .map(|t| FieldSig {
                    type_name: Some(t.to_string()),
                    ..FieldSig::default()
                })
                .collect(),
            ..MethodSig::default()
        };

        let hit = rule_set(vec![ClassRule {
            name: "Books".to_string(),
            methods: vec![sig(&["com.example.Book", "int"])],
            ..ClassRule::default()
        }]);
        let miss = rule_set(vec![ClassRule {
            name: "Books".to_string(),
            methods: vec![sig(&["com.example.Book"])],
            ..ClassRule::default()
        }]);

        let found = Matcher::new(&hit)
            .scan(vec![module("app.class", vec![target.clone()])])
            .expect("scan");
        assert_eq!(found.len(), 1);
        let missed = Matcher::new(&miss)
            .scan(vec![module("app.class", vec![target])])
            .expect("scan");
        assert!(missed.is_empty());
    }

    #[test]
    fn constructor_sig_matches_init_by_parameters() {
        let mut target = class("pkg.Bill");
        target.methods.push(method("<init>", "void", &["long"]));
        let rules = rule_set(vec![ClassRule {
            name: "Bill".to_string(),
            methods: vec![MethodSig {
                name: Some("constructor".to_string()),
                parameters: vec![FieldSig {
                    type_name: Some("long".to_string()),
                    ..FieldSig::default()
                }],
                ..MethodSig::default()
            }],
            ..ClassRule::default()
        }]);
        let results = Matcher::new(&rules)
            .scan(vec![module("app.class", vec![target])])
            .expect("scan");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn method_string_condition_requires_literal() {
        let mut target = class("pkg.Pay");
        let mut pay = method("submit", "void", &[]);
        pay.strings.push("order.created".to_string());
        target.methods.push(pay);

        let rules = |literal: &str| {
            rule_set(vec![ClassRule {
                name: "Pay".to_string(),
                methods: vec![MethodSig {
                    name: Some("submit".to_string()),
                    strings: vec![literal.to_string()],
                    ..MethodSig::default()
                }],
                ..ClassRule::default()
            }])
        };

        let hit = Matcher::new(&rules("order.created"))
            .scan(vec![module("app.class", vec![target.clone()])])
            .expect("scan");
        assert_eq!(hit.len(), 1);
        let miss = Matcher::new(&rules("order.closed"))
            .scan(vec![module("app.class", vec![target])])
            .expect("scan");
        assert!(miss.is_empty());
    }

    #[test]
    fn class_string_condition_requires_literal() {
        let mut target = class("pkg.Pay");
        target.strings.push("wx.pay.v3".to_string());
        let rules = rule_set(vec![ClassRule {
            name: "Pay".to_string(),
            strings: vec!["wx.pay.v3".to_string()],
            ..ClassRule::default()
        }]);
        let results = Matcher::new(&rules)
            .scan(vec![module("app.class", vec![class("pkg.Other"), target])])
            .expect("scan");
        assert_eq!(results.get("Pay").map(String::as_str), Some("pkg.Pay"));
    }

    #[test]
    fn progress_reports_each_match() {
        let rules = rule_set(vec![named_rule("First"), named_rule("Second")]);
        let seen = std::cell::RefCell::new(Vec::new());
        let progress = |found: usize, total: usize, name: &str| {
            seen.borrow_mut().push((found, total, name.to_string()));
        };
        let modules = vec![module("a.class", vec![class("pkg.Only")])];
        Matcher::new(&rules)
            .with_progress(&progress)
            .scan(modules)
            .expect("scan");
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (1, 2, "First".to_string()));
        assert_eq!(seen[1], (2, 2, "Second".to_string()));
    }

    #[test]
    fn invalid_name_pattern_is_an_error() {
        let rules = rule_set(vec![ClassRule {
            name: "Broken".to_string(),
            name_pattern: Some("(".to_string()),
            ..ClassRule::default()
        }]);
        let modules = vec![module("a.class", vec![class("pkg.First")])];
        assert!(Matcher::new(&rules).scan(modules).is_err());
    }
}
