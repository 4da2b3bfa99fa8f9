//! Case-insensitive identity for subscribed variables.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A variable name paired with an optional unit.
///
/// Two keys are equal when their names match case-insensitively and their
/// units either both match case-insensitively or are both absent. The original
/// spelling is preserved for display and for echoing back to clients; the
/// lowercased forms are computed once so lookups never allocate.
#[derive(Debug, Clone)]
pub struct VariableKey {
    name: String,
    unit: Option<String>,
    folded_name: String,
    folded_unit: Option<String>,
}

fn fold(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

fn folds_to(folded: &str, text: &str) -> bool {
    folded.chars().eq(text.chars().flat_map(char::to_lowercase))
}

impl VariableKey {
    /// Create a new key
    pub fn new(name: impl Into<String>, unit: Option<impl Into<String>>) -> Self {
        let name = name.into();
        let unit: Option<String> = unit.map(Into::into);
        Self {
            folded_name: fold(&name),
            folded_unit: unit.as_deref().map(fold),
            name,
            unit,
        }
    }

    /// Create a key that has no unit
    pub fn unitless(name: impl Into<String>) -> Self {
        Self::new(name, None::<String>)
    }

    /// The variable name as first spelled
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unit as first spelled, if any
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// The name lowercased, for matching against lowercase literals
    pub fn folded_name(&self) -> &str {
        &self.folded_name
    }

    /// Whether the name alone matches, ignoring the unit
    pub fn name_matches(&self, name: &str) -> bool {
        folds_to(&self.folded_name, name)
    }

    /// Whether the unit matches; `None` only matches a key without a unit
    pub fn unit_matches(&self, unit: Option<&str>) -> bool {
        match (&self.folded_unit, unit) {
            (Some(folded), Some(unit)) => folds_to(folded, unit),
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for VariableKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded_name == other.folded_name && self.folded_unit == other.folded_unit
    }
}

impl Eq for VariableKey {}

impl Hash for VariableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded_name.hash(state);
        self.folded_unit.hash(state);
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} ({})", self.name, unit),
            None => write!(f, "{} (no unit)", self.name),
        }
    }
}
