//! Kind and modifier flags for types, members and parameters.

use bitflags::bitflags;

use super::error::{DomError, Result};

/// The declaration kind of a type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Struct,
    Enum,
    Delegate,
}

bitflags! {
    /// Declaration modifiers shared by types and members.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u32 {
        const PRIVATE                = 0x0001;
        const INTERNAL               = 0x0002;
        const PROTECTED              = 0x0004;
        const PUBLIC                 = 0x0008;
        const ABSTRACT               = 0x0010;
        const VIRTUAL                = 0x0020;
        const SEALED                 = 0x0040;
        const STATIC                 = 0x0080;
        const OVERRIDE               = 0x0100;
        const READONLY               = 0x0200;
        const CONST                  = 0x0400;
        const PARTIAL                = 0x0800;
        const EXTERN                 = 0x1000;
        const UNSAFE                 = 0x2000;
        const SPECIAL_NAME           = 0x4000;
        const PROTECTED_AND_INTERNAL = 0x8000;

        const ACCESS_MASK = Self::PRIVATE.bits()
            | Self::INTERNAL.bits()
            | Self::PROTECTED.bits()
            | Self::PUBLIC.bits()
            | Self::PROTECTED_AND_INTERNAL.bits();
    }
}

bitflags! {
    /// Method-only flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MethodModifiers: u8 {
        const CONSTRUCTOR  = 0x01;
        const FINALIZER    = 0x02;
        /// First parameter is the `this` receiver.
        const EXTENSION    = 0x04;
        /// Synthesized by binding an extension method to a receiver.
        const WAS_EXTENDED = 0x08;
    }
}

bitflags! {
    /// Property-only flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PropertyModifiers: u8 {
        const HAS_GET    = 0x01;
        const HAS_SET    = 0x02;
        const IS_INDEXER = 0x04;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParameterModifiers: u8 {
        const IN       = 0x01;
        const OUT      = 0x02;
        const REF      = 0x04;
        const PARAMS   = 0x08;
        const OPTIONAL = 0x10;
    }
}

/// Effective visibility of a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Accessibility {
    Private,
    Internal,
    Protected,
    Public,
    ProtectedAndInternal,
    ProtectedOrInternal,
}

impl Accessibility {
    /// Decode a metadata member-access value (the three low bits of a
    /// method/field attribute word).
    pub fn from_metadata(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Accessibility::Private),
            2 => Ok(Accessibility::ProtectedAndInternal),
            3 => Ok(Accessibility::Internal),
            4 => Ok(Accessibility::Protected),
            5 => Ok(Accessibility::ProtectedOrInternal),
            6 => Ok(Accessibility::Public),
            other => Err(DomError::UnsupportedAccessibility(other)),
        }
    }

    /// The modifier bits that express this accessibility.
    pub fn to_modifiers(self) -> Modifiers {
        match self {
            Accessibility::Private => Modifiers::PRIVATE,
            Accessibility::Internal => Modifiers::INTERNAL,
            Accessibility::Protected => Modifiers::PROTECTED,
            Accessibility::Public => Modifiers::PUBLIC,
            Accessibility::ProtectedAndInternal => Modifiers::PROTECTED_AND_INTERNAL,
            Accessibility::ProtectedOrInternal => Modifiers::PROTECTED | Modifiers::INTERNAL,
        }
    }
}

impl Modifiers {
    /// The accessibility these modifiers express.
    ///
    /// No access bits means private (the language default for members).
    /// Any combination that is not one of the six known accessibilities is
    /// an internal consistency fault.
    pub fn accessibility(self) -> Result<Accessibility> {
        let access = self & Modifiers::ACCESS_MASK;
        if access.is_empty() || access == Modifiers::PRIVATE {
            Ok(Accessibility::Private)
        } else if access == Modifiers::INTERNAL {
            Ok(Accessibility::Internal)
        } else if access == Modifiers::PROTECTED {
            Ok(Accessibility::Protected)
        } else if access == Modifiers::PUBLIC {
            Ok(Accessibility::Public)
        } else if access == Modifiers::PROTECTED_AND_INTERNAL {
            Ok(Accessibility::ProtectedAndInternal)
        } else if access == Modifiers::PROTECTED | Modifiers::INTERNAL {
            Ok(Accessibility::ProtectedOrInternal)
        } else {
            Err(DomError::UnsupportedAccessibility(access.bits()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessibility_from_modifiers() {
        assert_eq!(Modifiers::empty().accessibility(), Ok(Accessibility::Private));
        assert_eq!(
            (Modifiers::PUBLIC | Modifiers::STATIC).accessibility(),
            Ok(Accessibility::Public)
        );
        assert_eq!(
            (Modifiers::PROTECTED | Modifiers::INTERNAL).accessibility(),
            Ok(Accessibility::ProtectedOrInternal)
        );
    }

    #[test]
    fn test_inconsistent_accessibility_fails() {
        let bad = Modifiers::PUBLIC | Modifiers::PRIVATE;
        assert_eq!(
            bad.accessibility(),
            Err(DomError::UnsupportedAccessibility(bad.bits()))
        );
    }

    #[test]
    fn test_metadata_accessibility() {
        assert_eq!(Accessibility::from_metadata(6), Ok(Accessibility::Public));
        assert_eq!(Accessibility::from_metadata(1), Ok(Accessibility::Private));
        assert_eq!(
            Accessibility::from_metadata(7),
            Err(DomError::UnsupportedAccessibility(7))
        );
        assert!(Accessibility::from_metadata(0).is_err());
    }

    #[test]
    fn test_accessibility_round_trips_through_modifiers() {
        for code in 1..=6 {
            let access = Accessibility::from_metadata(code).unwrap();
            assert_eq!(access.to_modifiers().accessibility(), Ok(access));
        }
    }
}
