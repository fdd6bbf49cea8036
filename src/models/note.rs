use super::WithClosure;
use crate::closure::NodeId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Kind of a note. Serialized and stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum NoteType {
    Basic = 1,
    Review = 2,
    Photo = 3,
    PublicChat = 4,
    PrivateChat = 5,
    CalendarEvent = 6,
    Calendar = 7,
    Ping = 8,
    Reaction = 9,
    Delete = 10,
    Reply = 11,
}

impl NoteType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => NoteType::Basic,
            2 => NoteType::Review,
            3 => NoteType::Photo,
            4 => NoteType::PublicChat,
            5 => NoteType::PrivateChat,
            6 => NoteType::CalendarEvent,
            7 => NoteType::Calendar,
            8 => NoteType::Ping,
            9 => NoteType::Reaction,
            10 => NoteType::Delete,
            11 => NoteType::Reply,
            _ => return None,
        })
    }

    /// Chat notes anchor a conversation that accounts join
    pub fn is_chat(self) -> bool {
        matches!(self, NoteType::PublicChat | NoteType::PrivateChat)
    }
}

impl JsonSchema for NoteType {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "NoteType".into()
    }

    fn json_schema(gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
        // Integer code, same as the serde representation
        gen.subschema_for::<u8>()
    }
}

/// A note as stored in the catalog. Notes form threads: a reply is a child
/// of the note it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Note {
    pub id: NodeId,

    pub account_id: i64,

    /// Signed event carrying the note content
    pub event_id: i64,

    #[serde(rename = "type")]
    pub note_type: NoteType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposted_note_id: Option<NodeId>,

    /// Replies below this note, filled in by `CatalogStorage::note_get`
    #[serde(default)]
    pub descendants: Vec<NoteWithClosure>,

    /// Creation timestamp (Unix seconds)
    #[serde(skip)]
    pub created_at: i64,
}

pub type NoteWithClosure = WithClosure<Note>;

/// Input for `CatalogStorage::note_create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub account_id: i64,
    pub event_id: i64,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    #[serde(default)]
    pub reposted_note_id: Option<NodeId>,
}

impl NewNote {
    pub fn new(account_id: i64, event_id: i64, note_type: NoteType) -> Self {
        Self {
            account_id,
            event_id,
            note_type,
            reposted_note_id: None,
        }
    }

    pub fn reposting(mut self, note_id: NodeId) -> Self {
        self.reposted_note_id = Some(note_id);
        self
    }
}

/// An account's membership in a chat note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChatMembership {
    pub id: i64,
    pub account_id: i64,
    pub note_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_note_id: Option<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_type_uses_integer_codes() {
        assert_eq!(serde_json::to_value(NoteType::Reply).unwrap(), 11);
        let parsed: NoteType = serde_json::from_value(serde_json::json!(4)).unwrap();
        assert_eq!(parsed, NoteType::PublicChat);
        assert!(parsed.is_chat());
    }

    #[test]
    fn note_type_codes_round_trip() {
        for code in 1..=11 {
            let kind = NoteType::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(NoteType::from_code(0), None);
        assert_eq!(NoteType::from_code(12), None);
    }

    #[test]
    fn note_serializes_type_field() {
        let note = Note {
            id: NodeId::new(3),
            account_id: 9,
            event_id: 40,
            note_type: NoteType::Basic,
            reposted_note_id: None,
            descendants: vec![],
            created_at: 0,
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], 1);
        assert!(json.get("reposted_note_id").is_none());
    }

    #[test]
    fn threads_with_replies_are_totally_comparable() {
        fn assert_eq_type<T: Eq>(_: &T) {}

        let note = |id, descendants| Note {
            id: NodeId::new(id),
            account_id: 1,
            event_id: id,
            note_type: NoteType::Basic,
            reposted_note_id: None,
            descendants,
            created_at: 0,
        };
        let reply = WithClosure {
            record: note(2, vec![]),
            ancestor_id: NodeId::new(1),
            descendant_id: NodeId::new(2),
            depth: 1,
        };
        let thread = note(1, vec![reply]);

        assert_eq_type(&thread);
        assert_eq!(thread.clone(), thread);
        assert_ne!(thread, note(1, vec![]));
    }
}
