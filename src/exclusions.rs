//! Reference exclusion policy.
//!
//! A retaining-path search must ignore references the runtime clears on its
//! own, otherwise every weakly-referenced object looks retained. An
//! [`ExcludedRefs`] policy names such references by class and field, and an
//! [`ExclusionMode`] decides how firmly each rule applies. Policies derive
//! `Serialize`/`Deserialize`, so a tool can ship its rule set as data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How firmly a matched reference is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionMode {
    /// The reference never counts as a retaining edge.
    Always,
    /// The reference is skipped unless it points directly at the leak
    /// under investigation.
    UnlessLeaking,
}

/// A set of references to ignore while searching for retaining paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludedRefs {
    /// Field rules, keyed by class name then field name.
    fields: HashMap<String, HashMap<String, ExclusionMode>>,
    /// Class-wide rules, keyed by class name.
    classes: HashMap<String, ExclusionMode>,
}

impl ExcludedRefs {
    /// An empty policy that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes references held in `class.field`.
    ///
    /// The rule also matches the field on subclass instances, because rule
    /// lookup walks the holder's class chain.
    pub fn exclude_field(
        &mut self,
        class: impl Into<String>,
        field: impl Into<String>,
        mode: ExclusionMode,
    ) -> &mut Self {
        self.fields
            .entry(class.into())
            .or_default()
            .insert(field.into(), mode);
        self
    }

    /// Excludes every reference held by instances of `class` or a subclass.
    pub fn exclude_class(&mut self, class: impl Into<String>, mode: ExclusionMode) -> &mut Self {
        self.classes.insert(class.into(), mode);
        self
    }

    /// The rule for the field `class.field`, ignoring class-wide rules.
    pub fn field_rule(&self, class: &str, field: &str) -> Option<ExclusionMode> {
        self.fields
            .get(class)
            .and_then(|by_field| by_field.get(field))
            .copied()
    }

    /// The class-wide rule for `class`, ignoring field rules.
    pub fn class_rule(&self, class: &str) -> Option<ExclusionMode> {
        self.classes.get(class).copied()
    }

    /// True when the policy holds no rules at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.classes.is_empty()
    }

    /// The exclusions that mirror what a tracing collector clears on its
    /// own: weak, soft and phantom referents plus finalizer bookkeeping.
    ///
    /// Following only these rules means the search traverses exactly the
    /// strong edges, the ones that actually retain an object.
    pub fn runtime_defaults() -> Self {
        let mut refs = Self::new();
        for class in [
            "java.lang.ref.Reference",
            "java.lang.ref.WeakReference",
            "java.lang.ref.SoftReference",
            "java.lang.ref.PhantomReference",
        ] {
            refs.exclude_field(class, "referent", ExclusionMode::Always);
        }
        for class in ["java.lang.ref.Finalizer", "java.lang.ref.FinalizerReference"] {
            refs.exclude_field(class, "prev", ExclusionMode::Always);
            refs.exclude_field(class, "element", ExclusionMode::Always);
            refs.exclude_field(class, "next", ExclusionMode::Always);
        }
        refs
    }
}
