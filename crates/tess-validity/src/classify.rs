use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tess_schemas::{AttrValue, Attribute, AttributeStream, EntityId};

/// How tangled an entity's name history is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryClass {
    /// One name, never carried by another entity.
    Easy,
    /// The entity carried several names.
    Renamed,
    /// One of its names was also carried by another entity (device swap).
    Repaired,
    /// Both renamed and repaired.
    Complicated,
}

impl HistoryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryClass::Easy => "easy",
            HistoryClass::Renamed => "renamed",
            HistoryClass::Repaired => "repaired",
            HistoryClass::Complicated => "complicated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameClassification {
    pub entity_id: EntityId,
    pub class: HistoryClass,
    /// Distinct names the entity carried, sorted.
    pub names: Vec<String>,
    /// Other entities that carried one of those names, sorted.
    pub shared_with: Vec<EntityId>,
}

/// Classify the name histories of many entities against each other.
///
/// Non-name streams are ignored. Output is sorted by entity id.
pub fn classify_names<'a, I>(streams: I) -> Vec<NameClassification>
where
    I: IntoIterator<Item = &'a AttributeStream>,
{
    let mut names_by_entity: BTreeMap<EntityId, BTreeSet<String>> = BTreeMap::new();
    let mut entities_by_name: BTreeMap<String, BTreeSet<EntityId>> = BTreeMap::new();

    for s in streams {
        if s.key.attribute != Attribute::Name {
            continue;
        }
        let names = names_by_entity.entry(s.key.entity_id.clone()).or_default();
        for r in &s.records {
            if let AttrValue::Name { name } = &r.value {
                names.insert(name.clone());
                entities_by_name
                    .entry(name.clone())
                    .or_default()
                    .insert(s.key.entity_id.clone());
            }
        }
    }

    names_by_entity
        .into_iter()
        .map(|(entity_id, names)| {
            let shared_with: BTreeSet<EntityId> = names
                .iter()
                .filter_map(|n| entities_by_name.get(n))
                .flatten()
                .filter(|e| **e != entity_id)
                .cloned()
                .collect();

            let renamed = names.len() > 1;
            let repaired = !shared_with.is_empty();
            let class = match (renamed, repaired) {
                (false, false) => HistoryClass::Easy,
                (true, false) => HistoryClass::Renamed,
                (false, true) => HistoryClass::Repaired,
                (true, true) => HistoryClass::Complicated,
            };

            NameClassification {
                entity_id,
                class,
                names: names.into_iter().collect(),
                shared_with: shared_with.into_iter().collect(),
            }
        })
        .collect()
}
