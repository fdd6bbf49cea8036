use crate::closure::NodeId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Relationship between an account and a place, ordered by commitment
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum AccountPlaceRoleType {
    Follower = 1,
    Visitor = 2,
    Inhabitant = 3,
    Ambassador = 4,
}

impl AccountPlaceRoleType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => AccountPlaceRoleType::Follower,
            2 => AccountPlaceRoleType::Visitor,
            3 => AccountPlaceRoleType::Inhabitant,
            4 => AccountPlaceRoleType::Ambassador,
            _ => return None,
        })
    }
}

impl JsonSchema for AccountPlaceRoleType {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "AccountPlaceRoleType".into()
    }

    fn json_schema(gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
        gen.subschema_for::<u8>()
    }
}

/// An account's role on one place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccountPlaceRole {
    pub account_id: i64,
    pub place_id: NodeId,
    #[serde(rename = "type")]
    pub role: AccountPlaceRoleType,
    pub ambassador_request: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_codes_round_trip() {
        for code in 1..=4 {
            assert_eq!(AccountPlaceRoleType::from_code(code).unwrap().code(), code);
        }
        assert_eq!(AccountPlaceRoleType::from_code(5), None);
        assert!(AccountPlaceRoleType::Ambassador > AccountPlaceRoleType::Visitor);
    }

    #[test]
    fn role_serializes_type_as_code() {
        let role = AccountPlaceRole {
            account_id: 1,
            place_id: NodeId::new(2),
            role: AccountPlaceRoleType::Inhabitant,
            ambassador_request: false,
        };
        let json = serde_json::to_value(&role).unwrap();
        assert_eq!(json["type"], 3);
        assert_eq!(json["place_id"], 2);
    }
}
