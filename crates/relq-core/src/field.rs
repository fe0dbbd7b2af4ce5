//! Fields: named, typed attributes of a parameter.

use serde::{Deserialize, Serialize};

use crate::ids::{ParamId, SearcherId};

/// Sort directive on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortMark {
    pub priority: u32,
    pub ascending: bool,
}

/// Grouping directive on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMark {
    pub priority: u32,
}

/// One column of a parameter, plus the query-relevant marks searchers and
/// join workers toggle on it.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) column: String,
    pub(crate) column_alias: Option<String>,
    pub(crate) value_type: String,
    pub(crate) owner: ParamId,
    pub(crate) searcher: Option<SearcherId>,
    pub(crate) output: bool,
    pub(crate) searched: bool,
    pub(crate) sort: Option<SortMark>,
    pub(crate) group: Option<GroupMark>,
    pub(crate) join_origin: bool,
    pub(crate) extra: Option<serde_json::Value>,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn column_alias(&self) -> Option<&str> {
        self.column_alias.as_deref()
    }

    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    pub fn owner(&self) -> ParamId {
        self.owner
    }

    pub fn searcher(&self) -> Option<SearcherId> {
        self.searcher
    }

    pub fn is_output(&self) -> bool {
        self.output
    }

    pub fn is_searched(&self) -> bool {
        self.searched
    }

    pub fn sort(&self) -> Option<SortMark> {
        self.sort
    }

    pub fn group(&self) -> Option<GroupMark> {
        self.group
    }

    pub fn is_join_origin(&self) -> bool {
        self.join_origin
    }

    pub fn extra(&self) -> Option<&serde_json::Value> {
        self.extra.as_ref()
    }

    /// A field keeps its join alive while any of these marks is set.
    pub(crate) fn in_use(&self) -> bool {
        self.output || self.searched || self.sort.is_some() || self.group.is_some()
    }

    pub(crate) fn clear_marks(&mut self) {
        self.output = false;
        self.searched = false;
        self.sort = None;
        self.group = None;
    }
}

/// Registration metadata for one field, passed to
/// [`crate::init::NodeBuilder::register_field`] by the initializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub column: String,
    pub value_type: String,
    #[serde(default)]
    pub column_alias: Option<String>,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl FieldConfig {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            value_type: value_type.into(),
            column_alias: None,
            extra: None,
        }
    }

    pub fn with_column_alias(mut self, alias: impl Into<String>) -> Self {
        self.column_alias = Some(alias.into());
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub(crate) fn into_field(self, owner: ParamId) -> Field {
        Field {
            name: self.name,
            column: self.column,
            column_alias: self.column_alias,
            value_type: self.value_type,
            owner,
            searcher: None,
            output: false,
            searched: false,
            sort: None,
            group: None,
            join_origin: false,
            extra: self.extra,
        }
    }
}
