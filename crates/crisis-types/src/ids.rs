//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every persisted record has a strongly-typed ID so an incident id can
//! never be passed where a volunteer id is expected. All IDs use UUID v7
//! (time-ordered) so primary-key order follows creation order.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl core::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a reported crisis incident.
    IncidentId
}

define_id! {
    /// Unique identifier for a progress update attached to an incident.
    UpdateId
}

define_id! {
    /// Unique identifier for a relief resource.
    ResourceId
}

define_id! {
    /// Unique identifier for a CAP alert record (distinct from the CAP
    /// `identifier` string carried inside the alert).
    AlertId
}

define_id! {
    /// Unique identifier for a registered volunteer.
    VolunteerId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_strings() {
        let id = IncidentId::new();
        let parsed: Result<IncidentId, _> = id.to_string().parse();
        assert_eq!(parsed.ok(), Some(id));
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let id = AlertId::new();
        let json = serde_json::to_value(id).unwrap_or_default();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!("not-a-uuid".parse::<VolunteerId>().is_err());
    }
}
