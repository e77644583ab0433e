//! Per-call working set for relationship edits.
//!
//! Every person an operation touches is loaded once into the set, edited in
//! place and written back in a single batch. Persons that do not exist yet
//! are created as placeholders inside that same batch.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::repository::FamilyTree;
use super::{Person, PersonId};
use crate::db::WriteBatch;
use crate::error::Result;

pub(crate) struct ChangeSet<'a> {
    tree: &'a FamilyTree,
    persons: HashMap<PersonId, Person>,
    order: Vec<PersonId>,
    created: usize,
}

impl<'a> ChangeSet<'a> {
    pub(crate) fn new(tree: &'a FamilyTree) -> Self {
        Self {
            tree,
            persons: HashMap::new(),
            order: Vec::new(),
            created: 0,
        }
    }

    /// The working copy of `id`, loading or creating it on first use.
    pub(crate) fn person(&mut self, id: &PersonId) -> Result<&mut Person> {
        match self.persons.entry(id.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let person = match self.tree.find_person(id)? {
                    Some(person) => person,
                    None => {
                        self.created += 1;
                        Person::placeholder(id.clone())
                    }
                };
                self.order.push(id.clone());
                Ok(entry.insert(person))
            }
        }
    }

    /// Write every touched person, in first-touch order, as one batch.
    pub(crate) fn commit(mut self) -> Result<Vec<Person>> {
        let mut batch = WriteBatch::new();
        let mut written = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(person) = self.persons.remove(id) {
                batch.set(self.tree.collection(), id.as_str(), serde_json::to_value(&person)?);
                written.push(person);
            }
        }
        if batch.is_empty() {
            return Ok(written);
        }

        tracing::debug!(persons = written.len(), created = self.created, "Committing tree changes");
        self.tree.commit(batch)?;
        Ok(written)
    }
}
