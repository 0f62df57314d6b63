//! Object-specification catalog interface.
//!
//! The static ECHONET class/property catalog is an external collaborator;
//! the model consumes it through [`ClassCatalog`]. [`StaticCatalog`] is a
//! ready-made map-backed implementation suitable for applications and
//! tests.

use std::collections::HashMap;
use std::sync::Arc;

/// Static description of one property of a class.
#[derive(Debug, Clone, Default)]
pub struct PropertySpec {
    /// Property code.
    pub epc: u8,
    /// Minimum EDT length, when the catalog knows it.
    pub min_size: Option<usize>,
    /// Maximum EDT length, when the catalog knows it.
    pub max_size: Option<usize>,
    pub can_get: bool,
    pub can_set: bool,
    pub can_announce: bool,
}

impl PropertySpec {
    /// Creates a spec with no capabilities and unknown size bounds;
    /// refine with the builder methods.
    pub fn new(epc: u8) -> Self {
        Self {
            epc,
            ..Default::default()
        }
    }

    pub fn with_size(mut self, min: usize, max: usize) -> Self {
        self.min_size = Some(min);
        self.max_size = Some(max);
        self
    }

    pub fn readable(mut self) -> Self {
        self.can_get = true;
        self
    }

    pub fn settable(mut self) -> Self {
        self.can_set = true;
        self
    }

    pub fn announces(mut self) -> Self {
        self.can_announce = true;
        self
    }

    /// Returns true when a value of this length satisfies the known
    /// size bounds.
    pub fn accepts(&self, value: &[u8]) -> bool {
        self.min_size.map_or(true, |min| value.len() >= min)
            && self.max_size.map_or(true, |max| value.len() <= max)
    }
}

/// Static description of one ECHONET class.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub class_group: u8,
    pub class: u8,
    pub properties: Vec<PropertySpec>,
}

impl ClassSpec {
    pub fn new(class_group: u8, class: u8, properties: Vec<PropertySpec>) -> Self {
        Self {
            class_group,
            class,
            properties,
        }
    }

    /// The synthetic spec for a class the catalog does not know: same
    /// identity, empty property list.
    pub fn synthetic(class_group: u8, class: u8) -> Self {
        Self::new(class_group, class, Vec::new())
    }

    pub fn property(&self, epc: u8) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.epc == epc)
    }
}

/// Lookup interface over the static object/property catalog.
pub trait ClassCatalog: Send + Sync {
    /// Returns the spec for a class, or `None` when the class is
    /// unknown.
    fn find_class(&self, class_group: u8, class: u8) -> Option<Arc<ClassSpec>>;

    /// Returns the spec for a class, substituting a synthetic empty spec
    /// for unknown classes.
    fn class_or_synthetic(&self, class_group: u8, class: u8) -> Arc<ClassSpec> {
        self.find_class(class_group, class)
            .unwrap_or_else(|| Arc::new(ClassSpec::synthetic(class_group, class)))
    }
}

/// Map-backed catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    classes: HashMap<(u8, u8), Arc<ClassSpec>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, spec: ClassSpec) -> Self {
        self.insert(spec);
        self
    }

    pub fn insert(&mut self, spec: ClassSpec) {
        self.classes
            .insert((spec.class_group, spec.class), Arc::new(spec));
    }
}

impl ClassCatalog for StaticCatalog {
    fn find_class(&self, class_group: u8, class: u8) -> Option<Arc<ClassSpec>> {
        self.classes.get(&(class_group, class)).cloned()
    }
}
