use super::WithClosure;
use crate::closure::NodeId;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Administrative level of a place. Regions contain cities, cities contain
/// neighborhoods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlaceLevel {
    Region,
    City,
    Neighborhood,
}

impl PlaceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceLevel::Region => "region",
            PlaceLevel::City => "city",
            PlaceLevel::Neighborhood => "neighborhood",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "region" => Some(PlaceLevel::Region),
            "city" => Some(PlaceLevel::City),
            "neighborhood" => Some(PlaceLevel::Neighborhood),
            _ => None,
        }
    }
}

/// OpenStreetMap element kind the place was imported from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OsmType {
    Node,
    Relation,
    Way,
}

impl OsmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsmType::Node => "node",
            OsmType::Relation => "relation",
            OsmType::Way => "way",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(OsmType::Node),
            "relation" => Some(OsmType::Relation),
            "way" => Some(OsmType::Way),
            _ => None,
        }
    }
}

/// A place as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Place {
    pub id: NodeId,

    pub name: String,

    /// Navigation slug derived from the name
    pub slug: String,

    pub level: PlaceLevel,

    pub description: String,

    pub lat: f64,

    pub lng: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub osm_type: Option<OsmType>,

    /// Unique reference into OpenStreetMap (e.g. `r123456`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub osm_ref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,

    pub active: bool,

    pub hashtags: Vec<String>,

    /// Everything below this place, filled in by `CatalogStorage::place_get`
    #[serde(default)]
    pub descendants: Vec<PlaceWithClosure>,

    /// Creation timestamp (Unix seconds)
    #[serde(skip)]
    pub created_at: i64,

    /// Last modified timestamp (Unix seconds)
    #[serde(skip)]
    pub updated_at: i64,
}

pub type PlaceWithClosure = WithClosure<Place>;

/// Input for `CatalogStorage::place_create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlace {
    pub name: String,
    pub level: PlaceLevel,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub osm_id: Option<i64>,
    #[serde(default)]
    pub osm_type: Option<OsmType>,
    #[serde(default)]
    pub osm_ref: Option<String>,
    #[serde(default)]
    pub country_id: Option<i64>,
    #[serde(default)]
    pub region_id: Option<i64>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl NewPlace {
    pub fn new(name: impl Into<String>, level: PlaceLevel) -> Self {
        Self {
            name: name.into(),
            level,
            description: String::new(),
            lat: 0.0,
            lng: 0.0,
            osm_id: None,
            osm_type: None,
            osm_ref: None,
            country_id: None,
            region_id: None,
            hashtags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.lat = lat;
        self.lng = lng;
        self
    }

    pub fn with_osm(mut self, osm_type: OsmType, osm_id: i64) -> Self {
        let prefix = match osm_type {
            OsmType::Node => 'n',
            OsmType::Relation => 'r',
            OsmType::Way => 'w',
        };
        self.osm_ref = Some(format!("{}{}", prefix, osm_id));
        self.osm_type = Some(osm_type);
        self.osm_id = Some(osm_id);
        self
    }

    pub fn with_country(mut self, country_id: i64) -> Self {
        self.country_id = Some(country_id);
        self
    }

    pub fn with_region(mut self, region_id: i64) -> Self {
        self.region_id = Some(region_id);
        self
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static pattern"))
}

/// Lowercase `name` and join its alphanumeric runs with `-`.
///
/// `"Lisbon, Portugal"` becomes `"lisbon-portugal"`.
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    separator_pattern()
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_punctuation_and_spaces() {
        assert_eq!(slugify("Lisbon, Portugal"), "lisbon-portugal");
        assert_eq!(slugify("  Bairro Alto  "), "bairro-alto");
        assert_eq!(slugify("São Paulo"), "são-paulo");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn place_level_round_trips_through_text() {
        for level in [PlaceLevel::Region, PlaceLevel::City, PlaceLevel::Neighborhood] {
            assert_eq!(PlaceLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(PlaceLevel::parse("continent"), None);
    }

    #[test]
    fn osm_builder_sets_reference() {
        let place = NewPlace::new("Lisbon", PlaceLevel::City).with_osm(OsmType::Relation, 5400890);
        assert_eq!(place.osm_ref.as_deref(), Some("r5400890"));
        assert_eq!(place.osm_type, Some(OsmType::Relation));
    }

    #[test]
    fn place_with_closure_serializes_flat() {
        let place = Place {
            id: NodeId::new(7),
            name: "Alfama".to_string(),
            slug: "alfama".to_string(),
            level: PlaceLevel::Neighborhood,
            description: String::new(),
            lat: 38.71,
            lng: -9.13,
            osm_id: None,
            osm_type: None,
            osm_ref: None,
            country_id: None,
            region_id: None,
            active: true,
            hashtags: vec![],
            descendants: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let decorated = WithClosure {
            record: place,
            ancestor_id: NodeId::new(1),
            descendant_id: NodeId::new(7),
            depth: 2,
        };

        let json = serde_json::to_value(&decorated).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["level"], "neighborhood");
        assert_eq!(json["ancestor_id"], 1);
        assert_eq!(json["descendant_id"], 7);
        assert_eq!(json["depth"], 2);
        assert!(json.get("created_at").is_none());
    }
}
