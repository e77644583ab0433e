//! Relationship consistency checks.
//!
//! The store keeps links as plain id strings with no referential integrity,
//! so every link is checked from both ends here.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::{Person, PersonId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Mother,
    Father,
    Spouse,
    Child,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Mother => "mother",
            Relation::Father => "father",
            Relation::Spouse => "spouse",
            Relation::Child => "child",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `child` names `parent` but `parent` does not list the child.
    MissingChildLink {
        parent: PersonId,
        child: PersonId,
    },
    /// `parent` lists `child` but the child names neither as mother nor father.
    MissingParentLink {
        parent: PersonId,
        child: PersonId,
    },
    /// `person` lists `spouse`, who does not list them back.
    AsymmetricSpouse {
        person: PersonId,
        spouse: PersonId,
    },
    /// Link to a person that is not stored.
    Dangling {
        person: PersonId,
        relation: Relation,
        target: PersonId,
    },
    SelfReference {
        person: PersonId,
        relation: Relation,
    },
    Duplicate {
        person: PersonId,
        relation: Relation,
        target: PersonId,
    },
    /// Two stored persons claim the same id.
    DuplicatePerson {
        person: PersonId,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingChildLink { parent, child } => {
                write!(f, "{} names {} as parent, but {} does not list them as a child", child, parent, parent)
            }
            Violation::MissingParentLink { parent, child } => {
                write!(f, "{} lists {} as a child, but {} does not name them as a parent", parent, child, child)
            }
            Violation::AsymmetricSpouse { person, spouse } => {
                write!(f, "{} lists {} as spouse, but not the other way round", person, spouse)
            }
            Violation::Dangling {
                person,
                relation,
                target,
            } => write!(f, "{} has {} {}, who does not exist", person, relation, target),
            Violation::SelfReference { person, relation } => {
                write!(f, "{} is their own {}", person, relation)
            }
            Violation::Duplicate {
                person,
                relation,
                target,
            } => write!(f, "{} lists {} {} more than once", person, relation, target),
            Violation::DuplicatePerson { person } => write!(f, "more than one person with id {}", person),
        }
    }
}

/// Every link problem in `persons`, in person order.
pub fn check_links(persons: &[Person]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut by_id: HashMap<&PersonId, &Person> = HashMap::with_capacity(persons.len());
    for person in persons {
        if by_id.insert(&person.id, person).is_some() {
            violations.push(Violation::DuplicatePerson {
                person: person.id.clone(),
            });
        }
    }

    for person in persons {
        let id = &person.id;
        let rels = &person.rels;

        for (relation, parent) in [(Relation::Mother, &rels.mother), (Relation::Father, &rels.father)] {
            let Some(parent) = parent else { continue };
            if parent == id {
                violations.push(Violation::SelfReference {
                    person: id.clone(),
                    relation,
                });
                continue;
            }
            match by_id.get(parent) {
                None => violations.push(Violation::Dangling {
                    person: id.clone(),
                    relation,
                    target: parent.clone(),
                }),
                Some(p) if !p.rels.children.contains(id) => violations.push(Violation::MissingChildLink {
                    parent: parent.clone(),
                    child: id.clone(),
                }),
                Some(_) => {}
            }
        }

        check_list(&mut violations, id, Relation::Child, &rels.children, |child| {
            match by_id.get(child) {
                None => Some(Violation::Dangling {
                    person: id.clone(),
                    relation: Relation::Child,
                    target: child.clone(),
                }),
                Some(c) if c.rels.mother.as_ref() != Some(id) && c.rels.father.as_ref() != Some(id) => {
                    Some(Violation::MissingParentLink {
                        parent: id.clone(),
                        child: child.clone(),
                    })
                }
                Some(_) => None,
            }
        });

        check_list(&mut violations, id, Relation::Spouse, &rels.spouses, |spouse| {
            match by_id.get(spouse) {
                None => Some(Violation::Dangling {
                    person: id.clone(),
                    relation: Relation::Spouse,
                    target: spouse.clone(),
                }),
                Some(s) if !s.rels.spouses.contains(id) => Some(Violation::AsymmetricSpouse {
                    person: id.clone(),
                    spouse: spouse.clone(),
                }),
                Some(_) => None,
            }
        });
    }

    violations
}

/// Self references and duplicates in a set-like list, then `check` on each
/// distinct remaining entry.
fn check_list<F>(violations: &mut Vec<Violation>, id: &PersonId, relation: Relation, ids: &[PersonId], check: F)
where
    F: Fn(&PersonId) -> Option<Violation>,
{
    let mut seen = HashSet::new();
    for target in ids {
        if !seen.insert(target) {
            violations.push(Violation::Duplicate {
                person: id.clone(),
                relation,
                target: target.clone(),
            });
            continue;
        }
        if target == id {
            violations.push(Violation::SelfReference {
                person: id.clone(),
                relation,
            });
            continue;
        }
        violations.extend(check(target));
    }
}
