//! Family tree persistence and relationship edits.
//!
//! Each relationship operation loads the persons it touches into a
//! [`ChangeSet`], edits them one after another and commits them as one
//! batch, so a link and its back-reference are written together or not at
//! all. Separate calls are not isolated from each other: two callers editing
//! the same person concurrently is last-write-wins.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::changeset::ChangeSet;
use super::chart::{ChartData, ChartRenderer};
use super::invariants::{check_links, Violation};
use super::{ParentType, Person, PersonDataUpdate, PersonId, SpouseOp};
use crate::config::ChartConfig;
use crate::context::AppContext;
use crate::db::{Document, DocumentStore, SetMode, WriteBatch};
use crate::error::{DataError, Result};
use crate::mirror::LiveMirror;

pub type TreeMirror = LiveMirror<Person>;

pub struct FamilyTree {
    store: Arc<dyn DocumentStore>,
    ctx: AppContext,
    collection: String,
    chart: ChartConfig,
    mirror: Option<TreeMirror>,
}

fn decode_person(doc: &Document) -> Result<Person> {
    Person::from_document(doc)
}

impl FamilyTree {
    pub fn new(store: Arc<dyn DocumentStore>, ctx: AppContext, collection: &str, chart: ChartConfig) -> Self {
        Self {
            store,
            ctx,
            collection: collection.to_string(),
            chart,
            mirror: None,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // === Lookup ===

    /// The stored person with `id`, if any. More than one match is a
    /// `Conflict`, also published to the error channel.
    pub fn find_person(&self, id: &PersonId) -> Result<Option<Person>> {
        let docs = self
            .ctx
            .errors
            .track(self.store.query_eq(&self.collection, "id", id.as_str()))?;
        match docs.as_slice() {
            [] => Ok(None),
            [doc] => self.ctx.errors.track(decode_person(doc)).map(Some),
            _ => {
                tracing::error!(id = %id, matches = docs.len(), "Duplicate person documents");
                Err(self
                    .ctx
                    .errors
                    .report(DataError::Conflict(format!("Oops, more than 1 person with id {}", id))))
            }
        }
    }

    /// The person with `id`, creating and storing an empty one if needed.
    pub fn get_or_create_person(&self, id: &str) -> Result<Person> {
        let id = PersonId::new(id)?;
        if let Some(person) = self.find_person(&id)? {
            return Ok(person);
        }

        let person = Person::placeholder(id);
        let data = serde_json::to_value(&person)?;
        self.ctx
            .errors
            .track(self.store.set(&self.collection, person.id.as_str(), &data, SetMode::Merge))?;
        tracing::info!(id = %person.id, "Created placeholder person");
        Ok(person)
    }

    /// One-shot read of every stored person, skipping undecodable documents.
    pub fn list(&self) -> Result<Vec<Person>> {
        let docs = self.ctx.errors.track(self.store.list(&self.collection))?;
        Ok(docs
            .iter()
            .filter_map(|doc| match decode_person(doc) {
                Ok(person) => Some(person),
                Err(e) => {
                    tracing::warn!(id = %doc.id, error = %e, "Skipping undecodable person");
                    None
                }
            })
            .collect())
    }

    // === Writes ===

    /// Remove a person's document. Links other persons hold to it are left
    /// in place; `check_consistency` reports them as dangling.
    pub fn delete_person(&self, id: &str) -> Result<()> {
        let id = PersonId::new(id)?;
        self.ctx.errors.track(self.store.delete(&self.collection, id.as_str()))?;
        tracing::info!(id = %id, "Person deleted");
        Ok(())
    }

    /// Overwrite each person's document, all in one batch.
    pub fn update_persons(&self, persons: &[Person]) -> Result<()> {
        let mut batch = WriteBatch::new();
        for person in persons {
            batch.set(&self.collection, person.id.as_str(), serde_json::to_value(person)?);
        }
        self.commit(batch)
    }

    /// Overwrite the given data fields, creating the person if needed.
    pub fn update_person_data(&self, id: &str, update: PersonDataUpdate) -> Result<Person> {
        let id = PersonId::new(id)?;
        let mut changes = ChangeSet::new(self);
        update.apply_to(&mut changes.person(&id)?.data);
        single(changes.commit()?)
    }

    pub(crate) fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.ctx.errors.track(self.store.commit(batch))
    }

    // === Relationships ===

    /// Point `id`'s mother or father slot at `parent_id`, or clear it.
    ///
    /// A previous parent in that slot stops listing `id` as a child. The new
    /// parent gains `id` as a child. Child, old parent and new parent are
    /// written in one batch.
    pub fn set_parent(&self, id: &str, parent_id: Option<&str>, parent_type: ParentType) -> Result<()> {
        let id = PersonId::new(id)?;
        let parent_id = parent_id.map(PersonId::new).transpose()?;
        let mut changes = ChangeSet::new(self);
        apply_set_parent(&mut changes, &id, parent_id, parent_type)?;
        changes.commit()?;
        Ok(())
    }

    pub fn set_mother(&self, id: &str, mother_id: Option<&str>) -> Result<()> {
        self.set_parent(id, mother_id, ParentType::Mother)
    }

    pub fn set_father(&self, id: &str, father_id: Option<&str>) -> Result<()> {
        self.set_parent(id, father_id, ParentType::Father)
    }

    /// Link or unlink two persons as spouses. Both sides are edited before
    /// the single batch write.
    pub fn update_spouse(&self, spouses: [&str; 2], op: SpouseOp) -> Result<()> {
        let a = PersonId::new(spouses[0])?;
        let b = PersonId::new(spouses[1])?;
        if a == b {
            return Err(DataError::validation(format!("{} cannot be their own spouse", a)));
        }

        let mut changes = ChangeSet::new(self);
        for (person, other) in [(&a, &b), (&b, &a)] {
            let rels = &mut changes.person(person)?.rels;
            match op {
                SpouseOp::Add => rels.add_spouse(other),
                SpouseOp::Remove => rels.remove_spouse(other),
            };
        }
        changes.commit()?;
        tracing::info!(a = %a, b = %b, op = ?op, "Spouse link updated");
        Ok(())
    }

    pub fn add_spouse(&self, spouses: [&str; 2]) -> Result<()> {
        self.update_spouse(spouses, SpouseOp::Add)
    }

    pub fn remove_spouse(&self, spouses: [&str; 2]) -> Result<()> {
        self.update_spouse(spouses, SpouseOp::Remove)
    }

    /// Make `child_id` a child of `id`, in the mother slot when `id` is
    /// recorded as female and the father slot otherwise.
    pub fn add_child(&self, id: &str, child_id: &str) -> Result<()> {
        let parent = PersonId::new(id)?;
        let child = PersonId::new(child_id)?;
        let mut changes = ChangeSet::new(self);
        let parent_type = ParentType::for_gender(changes.person(&parent)?.data.gender);
        apply_set_parent(&mut changes, &child, Some(parent), parent_type)?;
        changes.commit()?;
        Ok(())
    }

    /// Undo `add_child`. When the child's slot for `id`'s gender holds
    /// someone else, only a stray child link on `id` itself is dropped.
    pub fn remove_child(&self, id: &str, child_id: &str) -> Result<()> {
        let parent = PersonId::new(id)?;
        let child = PersonId::new(child_id)?;
        let mut changes = ChangeSet::new(self);
        let preferred = ParentType::for_gender(changes.person(&parent)?.data.gender);

        // The gender may have changed since the link was made, so both slots count.
        let rels = &changes.person(&child)?.rels;
        let slot = [preferred, preferred.other()]
            .into_iter()
            .find(|slot| rels.parent(*slot) == Some(&parent));

        match slot {
            Some(slot) => apply_set_parent(&mut changes, &child, None, slot)?,
            None => {
                tracing::debug!(parent = %parent, child = %child, "Child is not linked to this parent");
                // A stray back-reference on the parent is still dropped.
                if !changes.person(&parent)?.rels.remove_child(&child) {
                    return Ok(());
                }
            }
        }
        changes.commit()?;
        Ok(())
    }

    // === Live view ===

    /// Start mirroring the collection. Replaces any previous mirror.
    pub fn watch(&mut self) -> Result<()> {
        let subscription = self.ctx.errors.track(self.store.subscribe(&self.collection))?;
        self.mirror = Some(LiveMirror::new(subscription, self.ctx.errors.clone(), decode_person));
        Ok(())
    }

    pub fn unwatch(&mut self) {
        self.mirror = None;
    }

    pub fn is_watching(&self) -> bool {
        self.mirror.is_some()
    }

    /// Apply pending change notifications. Returns true if the mirror changed.
    pub fn refresh(&mut self) -> bool {
        self.mirror.as_mut().is_some_and(|m| m.refresh())
    }

    /// Block up to `timeout` for a change notification.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        self.mirror.as_mut().is_some_and(|m| m.wait(timeout))
    }

    /// Mirrored persons; empty when not watching.
    pub fn persons(&self) -> &[Person] {
        self.mirror.as_ref().map(|m| m.items()).unwrap_or(&[])
    }

    pub fn ids(&self) -> Vec<PersonId> {
        self.persons().iter().map(|p| p.id.clone()).collect()
    }

    pub fn id_exists(&self, id: &str) -> bool {
        self.persons().iter().any(|p| p.id == id)
    }

    /// Hand the mirrored persons to `renderer`.
    pub fn render(&self, renderer: &dyn ChartRenderer, out: &mut dyn Write) -> Result<()> {
        let chart = ChartData::new(self.persons(), &self.chart);
        tracing::debug!(persons = chart.data.len(), "Rendering family chart");
        renderer.render(&chart, out)
    }

    /// Link problems across every stored person.
    pub fn check_consistency(&self) -> Result<Vec<Violation>> {
        let persons = self.list()?;
        let violations = check_links(&persons);
        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "Family tree has inconsistent links");
        }
        Ok(violations)
    }
}

fn apply_set_parent(
    changes: &mut ChangeSet<'_>,
    id: &PersonId,
    parent_id: Option<PersonId>,
    parent_type: ParentType,
) -> Result<()> {
    if parent_id.as_ref() == Some(id) {
        return Err(DataError::validation(format!("{} cannot be their own {}", id, parent_type)));
    }

    let previous = changes.person(id)?.rels.parent(parent_type).cloned();
    if let Some(previous) = previous.filter(|p| Some(p) != parent_id.as_ref()) {
        changes.person(&previous)?.rels.remove_child(id);
    }

    if let Some(parent) = &parent_id {
        changes.person(parent)?.rels.add_child(id);
    }
    changes.person(id)?.rels.set_parent(parent_type, parent_id.clone());

    tracing::info!(
        child = %id,
        parent = ?parent_id.as_ref().map(PersonId::as_str),
        slot = %parent_type,
        "Parent updated"
    );
    Ok(())
}

fn single(mut persons: Vec<Person>) -> Result<Person> {
    persons
        .pop()
        .ok_or_else(|| DataError::backend("change set committed no persons"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::tree::chart::JsonChartRenderer;
    use crate::tree::{Gender, PersonRels};
    use serde_json::json;

    fn setup() -> (Arc<SqliteStore>, AppContext, FamilyTree) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.initialize().unwrap();
        let ctx = AppContext::new();
        let tree = FamilyTree::new(store.clone(), ctx.clone(), "tree", ChartConfig::default());
        (store, ctx, tree)
    }

    fn id(s: &str) -> PersonId {
        PersonId::new(s).unwrap()
    }

    fn stored(tree: &FamilyTree, id: &str) -> Person {
        tree.find_person(&PersonId::new(id).unwrap()).unwrap().unwrap()
    }

    fn with_gender(tree: &FamilyTree, who: &str, gender: Gender) {
        tree.update_person_data(
            who,
            PersonDataUpdate {
                gender: Some(gender),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_get_or_create_person_is_idempotent() {
        let (store, _, tree) = setup();

        let first = tree.get_or_create_person("p1").unwrap();
        assert!(first.rels.is_empty());
        assert!(first.rels.mother.is_none() && first.rels.father.is_none());

        let second = tree.get_or_create_person("p1").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list("tree").unwrap().len(), 1);
    }

    #[test]
    fn test_get_or_create_person_rejects_empty_id() {
        let (store, ctx, tree) = setup();
        let err = tree.get_or_create_person("").unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(store.list("tree").unwrap().is_empty());
        assert!(ctx.errors.current().is_none());
    }

    #[test]
    fn test_duplicate_person_is_a_published_conflict() {
        let (store, ctx, tree) = setup();
        let body = json!({"id": "dup", "data": {}, "rels": {}});
        store.set("tree", "dup-1", &body, SetMode::Overwrite).unwrap();
        store.set("tree", "dup-2", &body, SetMode::Overwrite).unwrap();

        let err = tree.get_or_create_person("dup").unwrap_err();
        assert!(matches!(err, DataError::Conflict(_)));
        assert_eq!(
            ctx.errors.current().as_deref(),
            Some("conflict: Oops, more than 1 person with id dup")
        );
    }

    #[test]
    fn test_set_parent_then_clear() {
        let (_, _, tree) = setup();
        tree.set_mother("c", Some("p")).unwrap();

        assert_eq!(stored(&tree, "c").rels.mother, Some(id("p")));
        assert_eq!(stored(&tree, "p").rels.children, vec![id("c")]);

        tree.set_mother("c", None).unwrap();
        assert!(stored(&tree, "c").rels.mother.is_none());
        assert!(stored(&tree, "p").rels.children.is_empty());
    }

    #[test]
    fn test_reassigning_parent_moves_child_link() {
        let (_, _, tree) = setup();
        tree.set_father("c", Some("f1")).unwrap();
        tree.set_father("c", Some("f2")).unwrap();

        let child = stored(&tree, "c");
        assert_eq!(child.rels.father, Some(id("f2")));
        assert!(child.rels.mother.is_none());
        assert!(stored(&tree, "f1").rels.children.is_empty());
        assert_eq!(stored(&tree, "f2").rels.children, vec![id("c")]);
    }

    #[test]
    fn test_reassigning_father_keeps_old_fathers_own_mother() {
        let (_, _, tree) = setup();
        tree.set_mother("f1", Some("grandma")).unwrap();
        tree.set_father("c", Some("f1")).unwrap();

        tree.set_father("c", Some("f2")).unwrap();

        let old_father = stored(&tree, "f1");
        assert_eq!(old_father.rels.mother, Some(id("grandma")));
        assert!(old_father.rels.children.is_empty());
        // The child's other slot is untouched
        assert!(stored(&tree, "c").rels.mother.is_none());
    }

    #[test]
    fn test_setting_same_parent_twice_is_stable() {
        let (_, _, tree) = setup();
        tree.set_mother("c", Some("m")).unwrap();
        tree.set_mother("c", Some("m")).unwrap();
        assert_eq!(stored(&tree, "m").rels.children, vec![id("c")]);
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let (store, _, tree) = setup();
        let err = tree.set_mother("c", Some("c")).unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(store.list("tree").unwrap().is_empty());
    }

    #[test]
    fn test_spouse_add_is_symmetric_and_deduplicated() {
        let (_, _, tree) = setup();
        tree.add_spouse(["a", "b"]).unwrap();
        tree.add_spouse(["a", "b"]).unwrap();
        tree.add_spouse(["b", "a"]).unwrap();

        assert_eq!(stored(&tree, "a").rels.spouses, vec![id("b")]);
        assert_eq!(stored(&tree, "b").rels.spouses, vec![id("a")]);
    }

    #[test]
    fn test_spouse_add_then_remove() {
        let (_, _, tree) = setup();
        tree.add_spouse(["a", "b"]).unwrap();
        tree.add_spouse(["a", "c"]).unwrap();
        tree.remove_spouse(["a", "b"]).unwrap();

        assert_eq!(stored(&tree, "a").rels.spouses, vec![id("c")]);
        assert!(stored(&tree, "b").rels.spouses.is_empty());
        assert!(tree.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn test_spouse_with_self_is_rejected() {
        let (_, _, tree) = setup();
        assert!(matches!(
            tree.add_spouse(["a", "a"]).unwrap_err(),
            DataError::Validation(_)
        ));
    }

    #[test]
    fn test_add_child_uses_parent_gender() {
        let (_, _, tree) = setup();
        with_gender(&tree, "anna", Gender::F);
        tree.add_child("anna", "kid").unwrap();
        tree.add_child("ben", "kid").unwrap();

        let kid = stored(&tree, "kid");
        assert_eq!(kid.rels.mother, Some(id("anna")));
        assert_eq!(kid.rels.father, Some(id("ben")));
        assert!(tree.check_consistency().unwrap().is_empty());

        tree.remove_child("anna", "kid").unwrap();
        let kid = stored(&tree, "kid");
        assert!(kid.rels.mother.is_none());
        assert_eq!(kid.rels.father, Some(id("ben")));
        assert!(stored(&tree, "anna").rels.children.is_empty());
    }

    #[test]
    fn test_remove_child_leaves_other_parents_link() {
        let (_, _, tree) = setup();
        tree.set_father("kid", Some("ben")).unwrap();

        // "piet" has no gender, so the father slot is checked and holds ben
        tree.remove_child("piet", "kid").unwrap();
        assert_eq!(stored(&tree, "kid").rels.father, Some(id("ben")));
        assert_eq!(stored(&tree, "ben").rels.children, vec![id("kid")]);
    }

    #[test]
    fn test_remove_child_after_gender_change_clears_either_slot() {
        let (_, _, tree) = setup();
        tree.add_child("anna", "kid").unwrap();
        assert_eq!(stored(&tree, "kid").rels.father, Some(id("anna")));

        with_gender(&tree, "anna", Gender::F);
        tree.remove_child("anna", "kid").unwrap();

        let kid = stored(&tree, "kid");
        assert!(kid.rels.father.is_none());
        assert!(kid.rels.mother.is_none());
        assert!(stored(&tree, "anna").rels.children.is_empty());
        assert!(tree.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn test_relationship_batch_is_all_or_nothing() {
        let (store, _, tree) = setup();
        // Ids with '/' are rejected by the store, failing the whole batch
        let err = tree.set_mother("c", Some("bad/id")).unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(store.list("tree").unwrap().is_empty());
    }

    #[test]
    fn test_update_persons_and_data() {
        let (_, _, tree) = setup();
        let mut person = tree.get_or_create_person("p").unwrap();
        person.data.name = Some("Piet".to_string());
        person.rels = PersonRels {
            spouses: vec![id("q")],
            ..Default::default()
        };
        tree.update_persons(&[person]).unwrap();

        let updated = tree
            .update_person_data(
                "p",
                PersonDataUpdate {
                    surname: Some("Botha".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.data.display_name(), "Piet Botha");
        assert_eq!(stored(&tree, "p").rels.spouses, vec![id("q")]);
    }

    #[test]
    fn test_delete_person_leaves_dangling_links() {
        let (_, _, tree) = setup();
        tree.add_spouse(["a", "b"]).unwrap();
        tree.delete_person("b").unwrap();

        assert!(tree.find_person(&id("b")).unwrap().is_none());
        let violations = tree.check_consistency().unwrap();
        assert_eq!(violations.len(), 1);
        assert!(matches!(&violations[0], Violation::Dangling { target, .. } if *target == id("b")));
    }

    #[test]
    fn test_mirror_ids_and_render() {
        let (_, _, mut tree) = setup();
        assert!(tree.ids().is_empty());

        tree.watch().unwrap();
        tree.set_mother("c", Some("m")).unwrap();
        assert!(tree.wait(Duration::from_secs(1)));
        assert_eq!(tree.ids(), vec![id("c"), id("m")]);
        assert!(tree.id_exists("m"));
        assert!(!tree.id_exists("x"));

        let mut out = Vec::new();
        tree.render(&JsonChartRenderer, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["data"][0]["data"]["avatar"], "./images/c.jpg");
        // Avatars are only set on the rendered copy
        assert!(tree.persons()[0].data.avatar.is_none());

        tree.unwatch();
        assert!(tree.persons().is_empty());
    }
}
