use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier such as `"products.create"` or `"operations.complete"`.
///
/// `"*"` grants everything. A permission ending in `".*"` grants every action
/// under that prefix, and `"*.read"` grants every read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Does holding `self` satisfy a requirement for `required`?
    pub fn grants(&self, required: &Permission) -> bool {
        let held = self.as_str();
        let wanted = required.as_str();

        if self.is_wildcard() || held == wanted {
            return true;
        }
        if let Some(action) = held.strip_prefix("*.") {
            return wanted.rsplit_once('.').is_some_and(|(_, a)| a == action);
        }
        if let Some(prefix) = held.strip_suffix(".*") {
            return wanted.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'));
        }
        false
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &'static str) -> Permission {
        Permission::new(s)
    }

    #[test]
    fn exact_and_global_wildcard() {
        assert!(p("products.create").grants(&p("products.create")));
        assert!(p("*").grants(&p("operations.complete")));
        assert!(!p("products.create").grants(&p("products.delete")));
    }

    #[test]
    fn action_wildcard_matches_any_resource() {
        assert!(p("*.read").grants(&p("stocks.read")));
        assert!(!p("*.read").grants(&p("stocks.adjust")));
    }

    #[test]
    fn prefix_wildcard_stays_inside_its_resource() {
        assert!(p("operations.*").grants(&p("operations.complete")));
        assert!(!p("operations.*").grants(&p("operationsx.complete")));
    }
}
