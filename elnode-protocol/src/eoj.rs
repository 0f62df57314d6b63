//! ECHONET object identifiers.

use std::fmt;

/// An ECHONET object identifier: class group code, class code, instance
/// code.
///
/// The instance code `0x00` is reserved as "any instance" and is treated
/// as a wildcard by [`Eoj::matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eoj {
    /// Class group code (e.g. `0x0E` for the profile group).
    pub class_group: u8,
    /// Class code within the group.
    pub class: u8,
    /// Instance code; `0x00` means "any instance".
    pub instance: u8,
}

impl Eoj {
    /// The node-profile object with the conventional instance code 1.
    pub const NODE_PROFILE: Eoj = Eoj::new(0x0E, 0xF0, 0x01);

    /// Creates an EOJ from its three bytes.
    pub const fn new(class_group: u8, class: u8, instance: u8) -> Self {
        Self {
            class_group,
            class,
            instance,
        }
    }

    /// Returns this EOJ with a different instance code.
    pub const fn with_instance(self, instance: u8) -> Self {
        Self { instance, ..self }
    }

    /// Returns true if this EOJ belongs to the node-profile class
    /// (class group `0x0E`, class `0xF0`), regardless of instance code.
    pub const fn is_node_profile(&self) -> bool {
        self.class_group == 0x0E && self.class == 0xF0
    }

    /// Returns true if both EOJs name the same class (group + class).
    pub const fn same_class(&self, other: &Eoj) -> bool {
        self.class_group == other.class_group && self.class == other.class
    }

    /// Class-aware match: the classes must be equal, and the instance
    /// codes must be equal unless either side is the `0x00` wildcard.
    pub const fn matches(&self, other: &Eoj) -> bool {
        self.same_class(other)
            && (self.instance == 0x00 || other.instance == 0x00 || self.instance == other.instance)
    }

    /// Returns the three wire bytes.
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.class_group, self.class, self.instance]
    }

    /// Parses an EOJ from three wire bytes.
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    /// Upper-hex rendering used by the JSON debug form, e.g. `"0EF001"`.
    pub fn to_hex(self) -> String {
        format!(
            "{:02X}{:02X}{:02X}",
            self.class_group, self.class, self.instance
        )
    }
}

impl fmt::Display for Eoj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}",
            self.class_group, self.class, self.instance
        )
    }
}
