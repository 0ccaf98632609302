use crate::{
    error::{AuthzError, Result},
    models::{RelationDescriptor, ResourceType},
};
use dashmap::DashMap;
use tracing::{debug, error};

/// Relation descriptors declared per parent type.
///
/// Declarations are not validated up front: a name that matches no
/// descriptor, or more than one, is reported when it is first accessed.
#[derive(Default)]
pub struct RelationRegistry {
    relations: DashMap<ResourceType, Vec<RelationDescriptor>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, parent_type: &str, descriptor: RelationDescriptor) {
        debug!(
            parent_type,
            relation = %descriptor.name,
            related_type = %descriptor.related_type,
            "Defining relation"
        );
        self.relations
            .entry(ResourceType::new(parent_type))
            .or_default()
            .push(descriptor);
    }

    /// The single descriptor addressed by `name` on `parent_type`
    pub fn resolve(&self, parent_type: &ResourceType, name: &str) -> Result<RelationDescriptor> {
        let mut matches = self
            .relations
            .get(parent_type)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|descriptor| descriptor.name == name)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        match matches.len() {
            0 => {
                error!(parent_type = %parent_type, relation = name, "Unknown relation");
                Err(AuthzError::UnknownRelation {
                    parent_type: parent_type.clone(),
                    relation: name.to_string(),
                })
            }
            1 => Ok(matches.remove(0)),
            count => {
                error!(
                    parent_type = %parent_type,
                    relation = name,
                    count,
                    "Ambiguous relation"
                );
                Err(AuthzError::AmbiguousRelation {
                    parent_type: parent_type.clone(),
                    relation: name.to_string(),
                    matches: count,
                })
            }
        }
    }
}
