use nova_jdwp::{EventModifier, Location};

/// Namespace prefixes whose code is treated as library code.
///
/// Library frames are not rendered, library locations do not produce points or
/// step requests, and library instances are emitted without their fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceFilter {
    prefixes: Vec<String>,
}

impl NamespaceFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// `true` when `type_name` lives under one of the prefixes.
    ///
    /// `java` matches `java.util.List` but not `javafx.Scene` or `java` itself.
    pub fn is_excluded(&self, type_name: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            type_name
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn reports_location(&self, location: &Location) -> bool {
        !self.is_excluded(&location.class_name)
    }

    /// Whether instance fields of `type_name` are rendered.
    pub fn shows_guts(&self, type_name: &str) -> bool {
        !self.is_excluded(type_name)
    }

    /// Class-exclusion modifiers for protocol requests (`java.*`, ...).
    pub fn class_exclusions(&self) -> Vec<EventModifier> {
        self.prefixes
            .iter()
            .map(|prefix| EventModifier::ClassExclude {
                pattern: format!("{prefix}.*"),
            })
            .collect()
    }
}

impl From<&nova_config::TraceConfig> for NamespaceFilter {
    fn from(config: &nova_config::TraceConfig) -> Self {
        Self::new(config.excluded_namespaces.iter().cloned())
    }
}
