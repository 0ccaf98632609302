use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The caller an authorization decision is made for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub roles: Vec<String>,
}

impl Subject {
    pub fn user(user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject:{}", self.id)
    }
}

/// Name of a record type, e.g. `user` or `blog_post`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case, space separated form used in user facing messages
    pub fn humanize(&self) -> String {
        self.0.replace(['_', '-'], " ").to_lowercase()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Persisted identity of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// A record managed by the resource layer.
///
/// The authorization layer only needs a record's type and identity; how the
/// record is stored or which attributes it has stays with the application.
pub trait Record: Clone + Send + Sync + 'static {
    fn resource_type(&self) -> ResourceType;

    /// `None` until the record has been persisted
    fn record_id(&self) -> Option<RecordId>;

    fn is_new_record(&self) -> bool {
        self.record_id().is_none()
    }
}

/// What a policy is being asked about
#[derive(Debug)]
pub enum Target<'a, R> {
    /// Collection-level operations
    Type(&'a ResourceType),
    /// Instance-level operations
    Record(&'a R),
}

impl<R> Clone for Target<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Target<'_, R> {}

impl<'a, R: Record> Target<'a, R> {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Target::Type(resource_type) => (*resource_type).clone(),
            Target::Record(record) => record.resource_type(),
        }
    }

    pub fn record(&self) -> Option<&'a R> {
        match *self {
            Target::Type(_) => None,
            Target::Record(record) => Some(record),
        }
    }
}

/// Mutation predicates a policy answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Destroy,
}

impl Action {
    /// `create` for records that were never persisted, `update` otherwise
    pub fn for_write<R: Record>(record: &R) -> Self {
        if record.is_new_record() {
            Action::Create
        } else {
            Action::Update
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inbound resource operation being served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Index,
    Show,
    Create,
    Update,
    Destroy,
    ShowRelationship,
    CreateRelationship,
    UpdateRelationship,
    DeleteRelationship,
    GetRelatedResource,
    GetRelatedResources,
}

impl Operation {
    /// Title case label, e.g. `Create Relationship`
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Index => "Index",
            Operation::Show => "Show",
            Operation::Create => "Create",
            Operation::Update => "Update",
            Operation::Destroy => "Destroy",
            Operation::ShowRelationship => "Show Relationship",
            Operation::CreateRelationship => "Create Relationship",
            Operation::UpdateRelationship => "Update Relationship",
            Operation::DeleteRelationship => "Delete Relationship",
            Operation::GetRelatedResource => "Get Related Resource",
            Operation::GetRelatedResources => "Get Related Resources",
        }
    }

    pub fn verb(&self) -> String {
        self.label().to_lowercase()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Action> for Operation {
    fn from(action: Action) -> Self {
        match action {
            Action::Create => Operation::Create,
            Action::Update => Operation::Update,
            Action::Destroy => Operation::Destroy,
        }
    }
}

/// Shape of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// Metadata describing a named relation of a parent type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Name the relation is addressed by from outside
    pub name: String,
    /// Name the record store uses to fetch the related value(s)
    pub accessor: String,
    pub kind: RelationKind,
    pub related_type: ResourceType,
}

impl RelationDescriptor {
    pub fn to_one(name: &str, related_type: &str) -> Self {
        Self {
            name: name.to_string(),
            accessor: name.to_string(),
            kind: RelationKind::ToOne,
            related_type: ResourceType::new(related_type),
        }
    }

    pub fn to_many(name: &str, related_type: &str) -> Self {
        Self {
            name: name.to_string(),
            accessor: name.to_string(),
            kind: RelationKind::ToMany,
            related_type: ResourceType::new(related_type),
        }
    }

    /// Fetch through a differently named accessor
    pub fn with_accessor(mut self, accessor: &str) -> Self {
        self.accessor = accessor.to_string();
        self
    }
}

/// Related value(s) as loaded from the record store
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedValue<R> {
    One(Option<R>),
    Many(Vec<R>),
}

impl<R> RelatedValue<R> {
    pub fn is_absent(&self) -> bool {
        matches!(self, RelatedValue::One(None))
    }

    pub fn into_one(self) -> Option<R> {
        match self {
            RelatedValue::One(record) => record,
            RelatedValue::Many(_) => None,
        }
    }

    pub fn into_many(self) -> Vec<R> {
        match self {
            RelatedValue::One(record) => record.into_iter().collect(),
            RelatedValue::Many(records) => records,
        }
    }
}
