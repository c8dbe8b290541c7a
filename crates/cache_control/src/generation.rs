//! Cache generation naming.
//!
//! Three generations are current at any time, all tagged with the build id:
//!
//! | generation | name |
//! |---|---|
//! | shell | `{prefix}-{build}` |
//! | static assets | `{prefix}-static-{build}` |
//! | dynamic | `{prefix}-dynamic-{build}` |
//!
//! A cache is owned by the application when its name is the prefix or starts
//! with `{prefix}-`. Owned caches that are not current are stale.

use crate::strategy::ResourceClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGenerations {
    prefix: String,
    build_id: String,
}

impl CacheGenerations {
    pub fn new(prefix: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            build_id: build_id.into(),
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn shell(&self) -> String {
        format!("{}-{}", self.prefix, self.build_id)
    }

    pub fn static_assets(&self) -> String {
        format!("{}-static-{}", self.prefix, self.build_id)
    }

    pub fn dynamic(&self) -> String {
        format!("{}-dynamic-{}", self.prefix, self.build_id)
    }

    /// Generation that stores responses of the given class
    pub fn for_class(&self, class: ResourceClass) -> String {
        match class {
            ResourceClass::Shell => self.shell(),
            ResourceClass::Static => self.static_assets(),
            ResourceClass::Dynamic => self.dynamic(),
        }
    }

    pub fn current(&self) -> [String; 3] {
        [self.shell(), self.static_assets(), self.dynamic()]
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.current().iter().any(|current| current == name)
    }

    pub fn owns(&self, name: &str) -> bool {
        name == self.prefix
            || name
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
    }

    pub fn is_stale(&self, name: &str) -> bool {
        self.owns(name) && !self.is_current(name)
    }

    /// Names from `existing` that cleanup should delete
    pub fn stale<'a, I>(&self, existing: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        existing
            .into_iter()
            .filter(|name| self.is_stale(name))
            .cloned()
            .collect()
    }
}
