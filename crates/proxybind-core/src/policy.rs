//! Return-value ownership policies.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// How the lifetime of a returned native value relates to its proxy.
///
/// Converters receive the policy as a `u8` across the boundary:
///
/// ```
/// use proxybind_core::RvPolicy;
///
/// assert_eq!(RvPolicy::try_from(3u8).ok(), Some(RvPolicy::Copy));
/// assert!(RvPolicy::try_from(42u8).is_err());
/// assert_eq!(u8::from(RvPolicy::Move), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RvPolicy {
    /// Only reuse an existing proxy; never create one.
    None = 0,
    /// Wrap the value; the native side keeps owning it.
    Reference = 1,
    /// Like `Reference`, and keep the owner object alive while the proxy lives.
    ReferenceInternal = 2,
    /// Copy the value into storage owned by the proxy.
    Copy = 3,
    /// Move the value into storage owned by the proxy.
    Move = 4,
    /// Wrap the value and take over destroying and deallocating it.
    TakeOwnership = 5,
}

impl RvPolicy {
    /// Whether the value is stored inside the proxy.
    pub fn stores_in_object(self) -> bool {
        matches!(self, RvPolicy::Copy | RvPolicy::Move)
    }

    /// Whether the proxy becomes responsible for destroying the value.
    pub fn owns_value(self) -> bool {
        matches!(
            self,
            RvPolicy::Copy | RvPolicy::Move | RvPolicy::TakeOwnership
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_matrix() {
        assert!(!RvPolicy::Reference.owns_value());
        assert!(!RvPolicy::ReferenceInternal.owns_value());
        assert!(RvPolicy::Copy.owns_value() && RvPolicy::Copy.stores_in_object());
        assert!(RvPolicy::Move.owns_value() && RvPolicy::Move.stores_in_object());
        assert!(RvPolicy::TakeOwnership.owns_value());
        assert!(!RvPolicy::TakeOwnership.stores_in_object());
        assert!(!RvPolicy::None.owns_value());
    }

    #[test]
    fn wire_values_round_trip() {
        for policy in [
            RvPolicy::None,
            RvPolicy::Reference,
            RvPolicy::ReferenceInternal,
            RvPolicy::Copy,
            RvPolicy::Move,
            RvPolicy::TakeOwnership,
        ] {
            assert_eq!(RvPolicy::try_from(u8::from(policy)).ok(), Some(policy));
        }
    }
}
