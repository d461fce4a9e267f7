/*!
 * Resource registry for robokit.
 *
 * The registry maps fully qualified resource names to type-erased resources.
 * The table is copy-on-write: every structural change builds a new table and
 * publishes it atomically, so a lookup always sees either the old or the new
 * table in full, and lookups never wait on writers.
 */
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::{ComponentError, Result};
use crate::resource::{Name, Subtype};

/// A type-erased resource as stored in the registry
///
/// Usually a reconfigurable wrapper such as `Arc<ReconfigurableBase>`; the
/// subtype modules know how to recover their contract from it.
pub type Resource = Arc<dyn Any + Send + Sync>;

type Table = HashMap<Name, Resource>;

/// Resource registry
pub struct Registry {
    /// The published table
    resources: ArcSwap<Table>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            resources: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Create a registry holding `resources`
    ///
    /// Fails if two entries share a name.
    pub fn from_resources<I>(resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Name, Resource)>,
    {
        let table = build_table(resources)?;
        let registry = Self::new();
        registry.resources.store(Arc::new(table));
        Ok(registry)
    }

    /// Register a resource under `name`
    pub fn register(&self, name: Name, resource: Resource) -> Result<()> {
        let mut duplicate = false;
        self.resources.rcu(|current| {
            duplicate = current.contains_key(&name);
            if duplicate {
                return Arc::clone(current);
            }
            let mut next = Table::clone(current);
            next.insert(name.clone(), Arc::clone(&resource));
            Arc::new(next)
        });

        if duplicate {
            return Err(ComponentError::DuplicateResource(name.to_string()));
        }

        debug!("Registered resource {}", name);
        Ok(())
    }

    /// Remove the resource registered under `name`
    pub fn remove(&self, name: &Name) -> Option<Resource> {
        let mut removed = None;
        self.resources.rcu(|current| {
            removed = current.get(name).cloned();
            if removed.is_none() {
                return Arc::clone(current);
            }
            let mut next = Table::clone(current);
            next.remove(name);
            Arc::new(next)
        });

        if removed.is_some() {
            debug!("Removed resource {}", name);
        }
        removed
    }

    /// Replace the whole table, e.g. after the robot's topology changed
    ///
    /// On error the current table stays in place.
    pub fn replace_all<I>(&self, resources: I) -> Result<()>
    where
        I: IntoIterator<Item = (Name, Resource)>,
    {
        let table = build_table(resources)?;
        let count = table.len();
        self.resources.store(Arc::new(table));

        debug!("Replaced registry table with {} resources", count);
        Ok(())
    }

    /// Look up the resource registered under `name`
    ///
    /// A missing name yields `ResourceNotFound`, e.g. `no generic sensor named
    /// sensor4`.
    pub fn lookup(&self, name: &Name) -> Result<Resource> {
        self.resources
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// Look up `name` and recover a typed handle with `cast`
    ///
    /// Errors name the subtype by its label. A resource `cast` rejects yields
    /// `WrongSubtype`.
    pub fn lookup_as<T, F>(&self, name: &Name, cast: F) -> Result<T>
    where
        F: FnOnce(&Resource) -> Option<T>,
    {
        let resource = self.lookup(name)?;
        cast(&resource).ok_or_else(|| {
            ComponentError::wrong_subtype(name.subtype().label(), name.short_name())
        })
    }

    /// The subtype of the resource registered under `name`
    pub fn subtype_of(&self, name: &Name) -> Result<Subtype> {
        if self.resources.load().contains_key(name) {
            Ok(name.subtype().clone())
        } else {
            Err(not_found(name))
        }
    }

    /// All registered names
    pub fn names(&self) -> Vec<Name> {
        self.resources.load().keys().cloned().collect()
    }

    /// Registered names of one subtype
    pub fn names_of(&self, subtype: &Subtype) -> Vec<Name> {
        self.resources
            .load()
            .keys()
            .filter(|name| name.subtype() == subtype)
            .cloned()
            .collect()
    }

    /// The current table
    pub fn snapshot(&self) -> Arc<HashMap<Name, Resource>> {
        self.resources.load_full()
    }

    /// Count registered resources
    pub fn len(&self) -> usize {
        self.resources.load().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.resources.load().is_empty()
    }

    /// Check if a resource is registered
    pub fn contains(&self, name: &Name) -> bool {
        self.resources.load().contains_key(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.names().iter().map(ToString::to_string).collect();
        names.sort();
        f.debug_struct("Registry").field("resources", &names).finish()
    }
}

fn not_found(name: &Name) -> ComponentError {
    ComponentError::not_found(name.subtype().label(), name.short_name())
}

fn build_table<I>(resources: I) -> Result<Table>
where
    I: IntoIterator<Item = (Name, Resource)>,
{
    let mut table = HashMap::new();
    for (name, resource) in resources {
        if table.contains_key(&name) {
            return Err(ComponentError::DuplicateResource(name.to_string()));
        }
        table.insert(name, resource);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRIPPER: Subtype = Subtype::component("gripper");
    const CAMERA: Subtype = Subtype::component("camera");

    fn resource(value: &'static str) -> Resource {
        Arc::new(value)
    }

    fn as_str(resource: &Resource) -> Option<&'static str> {
        resource.downcast_ref::<&'static str>().copied()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        let name = Name::from_subtype(&GRIPPER, "g1");
        registry.register(name.clone(), resource("one")).unwrap();

        assert!(registry.contains(&name));
        assert_eq!(registry.len(), 1);
        let found = registry.lookup(&name).unwrap();
        assert_eq!(as_str(&found), Some("one"));
        assert_eq!(registry.subtype_of(&name).unwrap(), GRIPPER);
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let registry = Registry::new();
        let name = Name::from_subtype(&GRIPPER, "nope");
        let err = registry.lookup(&name).err().unwrap();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no gripper named nope");
        assert!(registry.subtype_of(&name).unwrap_err().is_not_found());
    }

    #[test]
    fn test_same_short_name_under_other_subtype_is_not_found() {
        let registry = Registry::new();
        registry
            .register(Name::from_subtype(&CAMERA, "c1"), resource("cam"))
            .unwrap();
        let err = registry
            .lookup(&Name::from_subtype(&GRIPPER, "c1"))
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let registry = Registry::new();
        let name = Name::from_subtype(&GRIPPER, "g1");
        registry.register(name.clone(), resource("one")).unwrap();
        let err = registry.register(name.clone(), resource("two")).unwrap_err();
        assert!(matches!(err, ComponentError::DuplicateResource(_)));

        let found = registry.lookup(&name).unwrap();
        assert_eq!(as_str(&found), Some("one"));
    }

    #[test]
    fn test_from_resources_rejects_duplicates() {
        let name = Name::from_subtype(&GRIPPER, "g1");
        let result = Registry::from_resources(vec![
            (name.clone(), resource("one")),
            (name, resource("two")),
        ]);
        assert!(matches!(result, Err(ComponentError::DuplicateResource(_))));
    }

    #[test]
    fn test_lookup_as() {
        let name = Name::from_subtype(&GRIPPER, "g1");
        let registry = Registry::from_resources(vec![(name.clone(), resource("one"))]).unwrap();

        let value = registry.lookup_as(&name, as_str).unwrap();
        assert_eq!(value, "one");

        let err = registry
            .lookup_as(&name, |r| r.downcast_ref::<u32>().copied())
            .unwrap_err();
        assert_eq!(err.to_string(), "g1 is not a gripper");

        let err = registry
            .lookup_as(&Name::from_subtype(&GRIPPER, "g2"), as_str)
            .unwrap_err();
        assert_eq!(err.to_string(), "no gripper named g2");
    }

    #[test]
    fn test_lookups_share_the_label() {
        let claw = Subtype::component_with_label("gripper", "claw gripper");
        let registry = Registry::from_resources(vec![(
            Name::from_subtype(&claw, "g1"),
            resource("one"),
        )])
        .unwrap();
        let missing = Name::from_subtype(&claw, "g2");

        let untyped = registry.lookup(&missing).err().unwrap();
        let typed = registry.lookup_as(&missing, as_str).unwrap_err();
        let subtype = registry.subtype_of(&missing).unwrap_err();
        assert_eq!(untyped.to_string(), "no claw gripper named g2");
        assert_eq!(typed.to_string(), untyped.to_string());
        assert_eq!(subtype.to_string(), untyped.to_string());

        let err = registry
            .lookup_as(&Name::from_subtype(&claw, "g1"), |r| {
                r.downcast_ref::<u32>().copied()
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "g1 is not a claw gripper");
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_changes() {
        let registry = Registry::new();
        let g1 = Name::from_subtype(&GRIPPER, "g1");
        registry.register(g1.clone(), resource("one")).unwrap();

        let before = registry.snapshot();
        registry
            .replace_all(vec![(Name::from_subtype(&CAMERA, "c1"), resource("cam"))])
            .unwrap();

        assert!(before.contains_key(&g1));
        assert!(!registry.contains(&g1));
        assert_eq!(registry.names_of(&CAMERA).len(), 1);
        assert!(registry.names_of(&GRIPPER).is_empty());
    }

    #[test]
    fn test_failed_replace_keeps_table() {
        let registry = Registry::new();
        let g1 = Name::from_subtype(&GRIPPER, "g1");
        registry.register(g1.clone(), resource("one")).unwrap();

        let c1 = Name::from_subtype(&CAMERA, "c1");
        let result = registry.replace_all(vec![
            (c1.clone(), resource("cam")),
            (c1, resource("cam")),
        ]);
        assert!(result.is_err());
        assert!(registry.contains(&g1));
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new();
        let g1 = Name::from_subtype(&GRIPPER, "g1");
        registry.register(g1.clone(), resource("one")).unwrap();
        assert!(registry.remove(&g1).is_some());
        assert!(registry.remove(&g1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_whole_tables() {
        let registry = Arc::new(Registry::new());
        let a = Name::from_subtype(&GRIPPER, "a");
        let b = Name::from_subtype(&GRIPPER, "b");
        let old = vec![(a.clone(), resource("old")), (b.clone(), resource("old"))];
        registry.replace_all(old).unwrap();

        let reader = {
            let registry = Arc::clone(&registry);
            let (a, b) = (a.clone(), b.clone());
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let table = registry.snapshot();
                    let first = table.get(&a).and_then(as_str);
                    let second = table.get(&b).and_then(as_str);
                    assert_eq!(first, second);
                }
            })
        };

        for i in 0..1_000 {
            let tag = if i % 2 == 0 { "new" } else { "old" };
            registry
                .replace_all(vec![(a.clone(), resource(tag)), (b.clone(), resource(tag))])
                .unwrap();
        }
        reader.join().unwrap();
    }
}
