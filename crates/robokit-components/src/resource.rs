/*!
 * Resource names.
 *
 * A resource is addressed by its subtype (namespace, resource type and
 * subtype name) plus an instance name. The string form is
 * `namespace:type:subtype/name`, e.g. `rdk:component:base/base1`.
 */
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ComponentError;

/// Namespace of the built-in resources
pub const RESOURCE_NAMESPACE_RDK: &str = "rdk";

/// Resource type of components
pub const RESOURCE_TYPE_COMPONENT: &str = "component";

/// A category of resource sharing one capability contract
///
/// Identity is the namespace, resource type and subtype name. The label only
/// names the subtype in error messages and takes no part in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtype {
    namespace: Cow<'static, str>,
    resource_type: Cow<'static, str>,
    subtype: Cow<'static, str>,
    #[serde(skip)]
    label: Option<Cow<'static, str>>,
}

impl Subtype {
    /// Create a subtype from static parts, usable in constants
    pub const fn new(
        namespace: &'static str,
        resource_type: &'static str,
        subtype: &'static str,
    ) -> Self {
        Self {
            namespace: Cow::Borrowed(namespace),
            resource_type: Cow::Borrowed(resource_type),
            subtype: Cow::Borrowed(subtype),
            label: None,
        }
    }

    /// A component subtype called `label` in error messages
    pub const fn component_with_label(subtype: &'static str, label: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed(RESOURCE_NAMESPACE_RDK),
            resource_type: Cow::Borrowed(RESOURCE_TYPE_COMPONENT),
            subtype: Cow::Borrowed(subtype),
            label: Some(Cow::Borrowed(label)),
        }
    }

    /// Create a component subtype in the built-in namespace
    pub const fn component(subtype: &'static str) -> Self {
        Self::new(RESOURCE_NAMESPACE_RDK, RESOURCE_TYPE_COMPONENT, subtype)
    }

    /// The namespace, e.g. `rdk`
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The resource type, e.g. `component`
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The subtype name, e.g. `base`
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// How error messages name this subtype, e.g. `generic sensor`
    ///
    /// Falls back to the subtype name.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.subtype)
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.namespace, &self.resource_type, &self.subtype)
    }
}

impl PartialEq for Subtype {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Subtype {}

impl Hash for Subtype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Subtype {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subtype {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.resource_type, self.subtype)
    }
}

/// The fully qualified name of one resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    subtype: Subtype,
    name: String,
}

impl Name {
    /// Build the name of instance `name` of `subtype`
    pub fn from_subtype<S: Into<String>>(subtype: &Subtype, name: S) -> Self {
        Self {
            subtype: subtype.clone(),
            name: name.into(),
        }
    }

    /// The subtype part
    pub fn subtype(&self) -> &Subtype {
        &self.subtype
    }

    /// The short instance name; this is what travels on the wire
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// The namespace part
    pub fn namespace(&self) -> &str {
        self.subtype.namespace()
    }

    /// The resource type part
    pub fn resource_type(&self) -> &str {
        self.subtype.resource_type()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subtype, self.name)
    }
}

impl FromStr for Name {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (subtype, name) = s
            .split_once('/')
            .ok_or_else(|| ComponentError::InvalidName(s.to_string()))?;

        let parts: Vec<&str> = subtype.split(':').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) || name.is_empty() {
            return Err(ComponentError::InvalidName(s.to_string()));
        }

        Ok(Self {
            subtype: Subtype {
                namespace: Cow::Owned(parts[0].to_string()),
                resource_type: Cow::Owned(parts[1].to_string()),
                subtype: Cow::Owned(parts[2].to_string()),
                label: None,
            },
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: Subtype = Subtype::component("arm");

    #[test]
    fn test_name_from_subtype() {
        let name = Name::from_subtype(&ARM, "arm1");
        assert_eq!(name.namespace(), "rdk");
        assert_eq!(name.resource_type(), "component");
        assert_eq!(name.subtype().subtype(), "arm");
        assert_eq!(name.short_name(), "arm1");
        assert_eq!(name, Name::from_subtype(&ARM, "arm1"));
        assert_ne!(name, Name::from_subtype(&Subtype::component("base"), "arm1"));
    }

    #[test]
    fn test_label_is_not_identity() {
        let labelled = Subtype::component_with_label("arm", "robot arm");
        assert_eq!(labelled.label(), "robot arm");
        assert_eq!(ARM.label(), "arm");
        assert_eq!(labelled, ARM);
        assert_eq!(labelled.to_string(), "rdk:component:arm");

        let parsed: Name = "rdk:component:arm/arm1".parse().unwrap();
        assert_eq!(parsed, Name::from_subtype(&labelled, "arm1"));
    }

    #[test]
    fn test_name_string_round_trip() {
        let name = Name::from_subtype(&ARM, "arm1");
        let text = name.to_string();
        assert_eq!(text, "rdk:component:arm/arm1");

        let parsed: Name = text.parse().unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_instance_name_may_contain_slash() {
        let parsed: Name = "acme:component:gripper/left/finger".parse().unwrap();
        assert_eq!(parsed.namespace(), "acme");
        assert_eq!(parsed.short_name(), "left/finger");
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["", "arm1", "rdk:component/arm1", "rdk::arm/arm1", "rdk:component:arm/"] {
            assert!(
                matches!(bad.parse::<Name>(), Err(ComponentError::InvalidName(_))),
                "{bad} should not parse"
            );
        }
    }
}
