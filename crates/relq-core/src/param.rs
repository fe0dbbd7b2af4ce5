//! Parameter nodes: one mapped table occurrence each.

use crate::ids::{FieldId, JoinId, ParamId, SearcherId};

/// Structural kind of a parameter. Immutable once set, except that a root
/// absorbed by a dynamic join becomes `DynamicJoin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Root,
    DefaultJoin,
    InheritJoin,
    DynamicJoin,
}

impl ParamKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::DefaultJoin => "default-join",
            Self::InheritJoin => "inherit-join",
            Self::DynamicJoin => "dynamic-join",
        }
    }
}

/// One tree node. Owns its fields and searchers; children are linked through
/// the three join maps, each keyed by the origin field on *this* node.
///
/// `owned_fields`/`owned_searchers` include, besides the node's own, those
/// flattened up from inherit-joined descendants, so an inheriting node
/// presents the full column set of its ancestry.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub(crate) class_name: String,
    pub(crate) table_name: String,
    pub(crate) alias_base: String,
    pub(crate) table_alias: String,
    pub(crate) kind: ParamKind,
    pub(crate) path: Option<String>,
    pub(crate) parent: Option<ParamId>,
    pub(crate) fields: Vec<FieldId>,
    pub(crate) searchers: Vec<SearcherId>,
    pub(crate) owned_fields: Vec<FieldId>,
    pub(crate) owned_searchers: Vec<SearcherId>,
    pub(crate) default_joins: Vec<(FieldId, ParamId)>,
    pub(crate) inherit_joins: Vec<(FieldId, ParamId)>,
    pub(crate) dynamic_joins: Vec<(FieldId, ParamId)>,
    pub(crate) using_join: Option<JoinId>,
    pub(crate) has_field_searched: bool,
}

impl Parameter {
    pub(crate) fn new(
        class_name: String,
        kind: ParamKind,
        path: Option<String>,
        parent: Option<ParamId>,
    ) -> Self {
        Self {
            class_name,
            table_name: String::new(),
            alias_base: String::new(),
            table_alias: String::new(),
            kind,
            path,
            parent,
            fields: Vec::new(),
            searchers: Vec::new(),
            owned_fields: Vec::new(),
            owned_searchers: Vec::new(),
            default_joins: Vec::new(),
            inherit_joins: Vec::new(),
            dynamic_joins: Vec::new(),
            using_join: None,
            has_field_searched: false,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Globally unique after tree finalization.
    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Canonical dot-path from the root. `None` for dynamically joined nodes,
    /// which are reachable only by reference or through the dynamic-join map.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn parent(&self) -> Option<ParamId> {
        self.parent
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    pub fn searchers(&self) -> &[SearcherId] {
        &self.searchers
    }

    pub fn owned_fields(&self) -> &[FieldId] {
        &self.owned_fields
    }

    pub fn owned_searchers(&self) -> &[SearcherId] {
        &self.owned_searchers
    }

    pub fn default_joins(&self) -> &[(FieldId, ParamId)] {
        &self.default_joins
    }

    pub fn inherit_joins(&self) -> &[(FieldId, ParamId)] {
        &self.inherit_joins
    }

    pub fn dynamic_joins(&self) -> &[(FieldId, ParamId)] {
        &self.dynamic_joins
    }

    /// The edge through which this node joined its parent. Absent for roots.
    pub fn using_join(&self) -> Option<JoinId> {
        self.using_join
    }

    pub fn has_field_searched(&self) -> bool {
        self.has_field_searched
    }

    /// Children across all three join maps, origin field first.
    pub(crate) fn all_children(&self) -> impl Iterator<Item = (FieldId, ParamId)> + '_ {
        self.default_joins
            .iter()
            .chain(self.inherit_joins.iter())
            .chain(self.dynamic_joins.iter())
            .copied()
    }

    pub(crate) fn offset_ids(
        &mut self,
        param_offset: u32,
        field_offset: u32,
        searcher_offset: u32,
        join_offset: u32,
    ) {
        if let Some(p) = self.parent.as_mut() {
            *p = p.offset(param_offset);
        }
        for f in self
            .fields
            .iter_mut()
            .chain(self.owned_fields.iter_mut())
        {
            *f = f.offset(field_offset);
        }
        for s in self
            .searchers
            .iter_mut()
            .chain(self.owned_searchers.iter_mut())
        {
            *s = s.offset(searcher_offset);
        }
        for (f, p) in self
            .default_joins
            .iter_mut()
            .chain(self.inherit_joins.iter_mut())
            .chain(self.dynamic_joins.iter_mut())
        {
            *f = f.offset(field_offset);
            *p = p.offset(param_offset);
        }
        if let Some(j) = self.using_join.as_mut() {
            *j = j.offset(join_offset);
        }
    }
}
