//! Family tree: persons and the mother/father/spouse/child links between them.

mod changeset;
pub mod chart;
pub mod invariants;
pub mod repository;

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub use chart::{ChartData, ChartRenderer, HtmlChartRenderer, JsonChartRenderer};
pub use invariants::{check_links, Relation, Violation};
pub use repository::{FamilyTree, TreeMirror};

use crate::db::Document;
use crate::error::{DataError, Result};

/// Caller-assigned person identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonId(String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DataError::validation("Person ID cannot be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PersonId {
    type Error = DataError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl TryFrom<&str> for PersonId {
    type Error = DataError;

    fn try_from(id: &str) -> Result<Self> {
        Self::new(id)
    }
}

impl From<PersonId> for String {
    fn from(id: PersonId) -> Self {
        id.0
    }
}

impl Borrow<str> for PersonId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PersonId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl PartialEq<str> for PersonId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PersonId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
}

/// Anything but "M" or "F" (including the empty string) reads as unknown.
fn lenient_gender<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Gender>, D::Error> {
    Ok(match Option::<String>::deserialize(deserializer)?.as_deref() {
        Some("M") => Some(Gender::M),
        Some("F") => Some(Gender::F),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient_gender", skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

impl PersonData {
    /// "name surname", skipping whichever part is missing.
    pub fn display_name(&self) -> String {
        [self.name.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Fields to overwrite in a person's data; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonDataUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub birthday: Option<String>,
    pub avatar: Option<String>,
    pub gender: Option<Gender>,
}

impl PersonDataUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(self, data: &mut PersonData) {
        if let Some(name) = self.name {
            data.name = Some(name);
        }
        if let Some(surname) = self.surname {
            data.surname = Some(surname);
        }
        if let Some(birthday) = self.birthday {
            data.birthday = Some(birthday);
        }
        if let Some(avatar) = self.avatar {
            data.avatar = Some(avatar);
        }
        if let Some(gender) = self.gender {
            data.gender = Some(gender);
        }
    }
}

/// Older documents use `""` for an absent parent.
fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<PersonId>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|id| !id.is_empty())
        .map(PersonId))
}

/// A missing or null list reads as empty; empty ids are dropped.
fn id_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<PersonId>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .filter(|id| !id.is_empty())
        .map(PersonId)
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRels {
    #[serde(default, deserialize_with = "optional_id")]
    pub mother: Option<PersonId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub father: Option<PersonId>,
    #[serde(default, deserialize_with = "id_list")]
    pub spouses: Vec<PersonId>,
    #[serde(default, deserialize_with = "id_list")]
    pub children: Vec<PersonId>,
}

impl PersonRels {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn parent(&self, parent_type: ParentType) -> Option<&PersonId> {
        match parent_type {
            ParentType::Mother => self.mother.as_ref(),
            ParentType::Father => self.father.as_ref(),
        }
    }

    pub fn set_parent(&mut self, parent_type: ParentType, parent: Option<PersonId>) {
        match parent_type {
            ParentType::Mother => self.mother = parent,
            ParentType::Father => self.father = parent,
        }
    }

    /// Returns false if `child` was already listed.
    pub fn add_child(&mut self, child: &PersonId) -> bool {
        insert_unique(&mut self.children, child)
    }

    pub fn remove_child(&mut self, child: &PersonId) -> bool {
        remove_all(&mut self.children, child)
    }

    pub fn add_spouse(&mut self, spouse: &PersonId) -> bool {
        insert_unique(&mut self.spouses, spouse)
    }

    pub fn remove_spouse(&mut self, spouse: &PersonId) -> bool {
        remove_all(&mut self.spouses, spouse)
    }
}

fn insert_unique(ids: &mut Vec<PersonId>, id: &PersonId) -> bool {
    if ids.contains(id) {
        false
    } else {
        ids.push(id.clone());
        true
    }
}

fn remove_all(ids: &mut Vec<PersonId>, id: &PersonId) -> bool {
    let before = ids.len();
    ids.retain(|existing| existing != id);
    ids.len() != before
}

/// A missing or null section reads as its default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: PersonData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rels: PersonRels,
}

impl Person {
    /// A person with no data and no relationships.
    pub fn placeholder(id: PersonId) -> Self {
        Self {
            id,
            data: PersonData::default(),
            rels: PersonRels::default(),
        }
    }

    /// Decode a stored person. The body's `id` wins; documents written
    /// without one fall back to the document id.
    pub fn from_document(doc: &Document) -> Result<Self> {
        #[derive(Deserialize)]
        struct Stored {
            #[serde(default)]
            id: Option<String>,
            #[serde(default, deserialize_with = "null_as_default")]
            data: PersonData,
            #[serde(default, deserialize_with = "null_as_default")]
            rels: PersonRels,
        }

        if !doc.data.is_object() {
            return Err(DataError::validation(format!("person {} is not an object", doc.id)));
        }
        let stored: Stored = doc.decode()?;
        let id = match stored.id.filter(|id| !id.is_empty()) {
            Some(id) => PersonId(id),
            None => PersonId::new(doc.id.clone())?,
        };
        Ok(Self {
            id,
            data: stored.data,
            rels: stored.rels,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentType {
    Mother,
    Father,
}

impl ParentType {
    /// Slot a parent of this gender fills: mothers are female, anyone else
    /// is recorded as father.
    pub fn for_gender(gender: Option<Gender>) -> Self {
        match gender {
            Some(Gender::F) => ParentType::Mother,
            _ => ParentType::Father,
        }
    }

    pub fn other(self) -> Self {
        match self {
            ParentType::Mother => ParentType::Father,
            ParentType::Father => ParentType::Mother,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParentType::Mother => "mother",
            ParentType::Father => "father",
        }
    }
}

impl fmt::Display for ParentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpouseOp {
    Add,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> PersonId {
        PersonId::new(s).unwrap()
    }

    #[test]
    fn test_person_id_rejects_empty() {
        assert!(matches!(PersonId::new(""), Err(DataError::Validation(_))));
        assert!(serde_json::from_value::<PersonId>(json!("")).is_err());
        assert_eq!(serde_json::to_value(id("p1")).unwrap(), json!("p1"));
    }

    #[test]
    fn test_legacy_person_document() {
        let doc = Document {
            id: "anna".to_string(),
            data: json!({
                "id": "anna",
                "data": {"name": "Anna", "gender": ""},
                "rels": {"mother": "", "father": "piet", "children": ["", "jan"]}
            }),
            updated_at: None,
        };
        let person = Person::from_document(&doc).unwrap();
        assert_eq!(person.rels.mother, None);
        assert_eq!(person.rels.father, Some(id("piet")));
        assert_eq!(person.rels.children, vec![id("jan")]);
        assert!(person.rels.spouses.is_empty());
        assert_eq!(person.data.gender, None);
    }

    #[test]
    fn test_person_without_rels_or_body_id() {
        let doc = Document {
            id: "ben".to_string(),
            data: json!({"data": {"name": "Ben", "gender": "M"}}),
            updated_at: None,
        };
        let person = Person::from_document(&doc).unwrap();
        assert_eq!(person.id, id("ben"));
        assert!(person.rels.is_empty());
        assert_eq!(person.data.gender, Some(Gender::M));
    }

    #[test]
    fn test_person_with_null_sections() {
        let doc = Document {
            id: "cleo".to_string(),
            data: json!({"id": "cleo", "data": null, "rels": null}),
            updated_at: None,
        };
        let person = Person::from_document(&doc).unwrap();
        assert_eq!(person, Person::placeholder(id("cleo")));

        let decoded: Person = serde_json::from_value(json!({"id": "cleo", "rels": null})).unwrap();
        assert!(decoded.rels.is_empty());
    }

    #[test]
    fn test_encoded_shape() {
        let mut person = Person::placeholder(id("c"));
        person.rels.set_parent(ParentType::Mother, Some(id("m")));
        let value = serde_json::to_value(&person).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "c",
                "data": {},
                "rels": {"mother": "m", "father": null, "spouses": [], "children": []}
            })
        );
    }

    #[test]
    fn test_set_semantics() {
        let mut rels = PersonRels::default();
        assert!(rels.add_spouse(&id("b")));
        assert!(!rels.add_spouse(&id("b")));
        assert_eq!(rels.spouses.len(), 1);
        assert!(rels.remove_spouse(&id("b")));
        assert!(!rels.remove_spouse(&id("b")));
    }

    #[test]
    fn test_data_update_and_display_name() {
        let mut data = PersonData {
            name: Some("Anna".to_string()),
            birthday: Some("1931".to_string()),
            ..Default::default()
        };
        PersonDataUpdate {
            surname: Some("de Villiers".to_string()),
            gender: Some(Gender::F),
            ..Default::default()
        }
        .apply_to(&mut data);

        assert_eq!(data.display_name(), "Anna de Villiers");
        assert_eq!(data.birthday.as_deref(), Some("1931"));
        assert_eq!(ParentType::for_gender(data.gender), ParentType::Mother);
        assert_eq!(ParentType::for_gender(None), ParentType::Father);
    }
}
