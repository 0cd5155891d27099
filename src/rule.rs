//! Declarative rules describing the classes a caller needs to locate.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ir::ClassDef;

/// Kind constraint for a class rule.
///
/// `Any` and `Class` accept every class: a rule restricted to `class` does
/// *not* exclude interfaces, abstract classes, or enums. Existing rule sets
/// rely on this, so it is part of the contract rather than a gap to close.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Any,
    Class,
    Interface,
    Abstract,
    Enum,
}

impl ClassKind {
    /// Whether a class with the given kind flags passes this constraint.
    pub fn admits(self, def: &ClassDef) -> bool {
        match self {
            ClassKind::Interface => def.is_interface,
            ClassKind::Abstract => def.is_abstract,
            ClassKind::Enum => def.is_enum,
            ClassKind::Any | ClassKind::Class => true,
        }
    }
}

/// One required field; for enum rules, one required constant name.
///
/// A signature with neither name nor type never matches anything.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSig {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
}

/// One required method. Every set condition must hold for a candidate; an
/// empty parameter list means the arity is unconstrained, a non-empty one
/// requires exact arity and positional type equality.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSig {
    /// Exact method name. The special value `constructor` targets `<init>`
    /// methods, which are then matched by parameter list alone.
    pub name: Option<String>,
    /// Regular expression the whole method name must match.
    pub name_pattern: Option<String>,
    pub return_type: Option<String>,
    /// Modifier keywords in canonical order, e.g. `public static`.
    pub modifiers: Option<String>,
    pub parameters: Vec<FieldSig>,
    /// String literals the method body must load.
    pub strings: Vec<String>,
}

impl MethodSig {
    /// A signature with no condition at all never matches anything.
    pub(crate) fn is_vacuous(&self) -> bool {
        set(&self.name).is_none()
            && set(&self.name_pattern).is_none()
            && set(&self.return_type).is_none()
            && set(&self.modifiers).is_none()
            && self.parameters.is_empty()
            && self.strings.is_empty()
    }
}

/// Declarative description of one class to locate by structure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassRule {
    /// Logical name the caller knows the class by; key of the result map.
    pub name: String,
    /// Regular expression the whole qualified class name must match.
    pub name_pattern: Option<String>,
    pub kind: ClassKind,
    /// Required fields; for `kind: enum`, required constant names.
    pub fields: Vec<FieldSig>,
    pub methods: Vec<MethodSig>,
    /// String literals the class must reference somewhere.
    pub strings: Vec<String>,
}

/// Ordered rule set with unique logical names.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<ClassRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ClassRule>) -> Result<Self> {
        for (index, rule) in rules.iter().enumerate() {
            if rule.name.is_empty() {
                bail!("rule #{index} has no logical name");
            }
            if rules[..index].iter().any(|other| other.name == rule.name) {
                bail!("duplicate rule name {}", rule.name);
            }
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassRule> {
        self.rules.iter()
    }

    /// Stable fingerprint of the rule set, used to invalidate cached
    /// mappings when the rules themselves change.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.rules).expect("serialize rule set");
        let digest = Sha256::digest(&canonical);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }
}

/// Treat `None` and the empty string alike: both mean "no condition".
pub(crate) fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}
