//! Per-tree shared state: arenas, registries, and the join engine.
//!
//! A [`ParameterContext`] owns every node of one parameter tree. Parameters,
//! fields, searchers and join edges live in arenas and reference each other
//! by id, so the whole graph is navigable without reference cycles. All
//! mutation funnels through the context: searcher operations, lazy join
//! materialization and rollback, path resolution, alias allocation, and the
//! connective state machine.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, trace};

use crate::{
    backend::{CompareOp, Connective, JoinSpec, Operand, QueryBackend},
    error::{QueryError, Result},
    expr::{self, ExprOp, Side, SideSymbols, ORIGIN_SYMBOL, TARGET_SYMBOL},
    field::{Field, FieldConfig, GroupMark, SortMark},
    ids::{FieldId, JoinId, ParamId, SearcherId},
    init::{NodeBuilder, TreeInitializer},
    join::{JoinKind, JoinWorker, RelationKind},
    param::{ParamKind, Parameter},
    search_context::{EntryKey, EntryOrigin, FragmentRole, SearchContext},
    searcher::{Searcher, SearcherNode},
    transform::TransformerRegistry,
};

/// Page selection shared by the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

/// One rendered output column, pulled at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub expr: String,
    pub alias: Option<String>,
}

/// Owner of one parameter tree and everything reachable from it.
pub struct ParameterContext<B: QueryBackend> {
    backend: B,
    pub(crate) params: Vec<Parameter>,
    pub(crate) fields: Vec<Field>,
    pub(crate) searchers: Vec<SearcherNode>,
    pub(crate) joins: Vec<JoinWorker>,
    main: SearchContext<B::Fragment>,
    scratch: Vec<SearchContext<B::Fragment>>,
    params_by_path: HashMap<String, ParamId>,
    searchers_by_path: HashMap<String, SearcherId>,
    pub(crate) transformers: Arc<TransformerRegistry<B::Value>>,
    alias_counter: u32,
    aliases_assigned: bool,
    page: Option<Pagination>,
    needs_connective: bool,
    delimiter_depth: u32,
    auto_chain: Option<Connective>,
    side_origin: String,
    side_target: String,
    pub(crate) building_stack: Vec<String>,
}

impl<B: QueryBackend> std::fmt::Debug for ParameterContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterContext")
            .field("params", &self.params)
            .field("searchers", &self.searchers)
            .finish_non_exhaustive()
    }
}

impl<B: QueryBackend> ParameterContext<B> {
    /// Builds a whole tree for `root_class`: constructs the context, runs the
    /// initializer over the root and, transitively, every structural join it
    /// registers, then assigns table aliases exactly once.
    pub fn init<I: TreeInitializer<B>>(
        backend: B,
        initializer: &I,
        root_class: &str,
    ) -> Result<Self> {
        let mut ctx = Self {
            backend,
            params: Vec::new(),
            fields: Vec::new(),
            searchers: Vec::new(),
            joins: Vec::new(),
            main: SearchContext::new(),
            scratch: Vec::new(),
            params_by_path: HashMap::new(),
            searchers_by_path: HashMap::new(),
            transformers: initializer.transformers(),
            alias_counter: 0,
            aliases_assigned: false,
            page: None,
            needs_connective: false,
            delimiter_depth: 0,
            auto_chain: None,
            side_origin: ORIGIN_SYMBOL.to_string(),
            side_target: TARGET_SYMBOL.to_string(),
            building_stack: Vec::new(),
        };
        let root = ctx.new_param(root_class.to_string(), ParamKind::Root, Some(String::new()), None);
        ctx.params_by_path.insert(String::new(), root);
        ctx.populate_node(initializer, root, root_class)?;
        ctx.finalize_aliases();
        debug!(
            class = root_class,
            params = ctx.params.len(),
            fields = ctx.fields.len(),
            "initialized parameter tree"
        );
        Ok(ctx)
    }

    pub fn root(&self) -> ParamId {
        ParamId::new(0)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn param(&self, id: ParamId) -> &Parameter {
        &self.params[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    pub fn searcher_node(&self, id: SearcherId) -> &SearcherNode {
        &self.searchers[id.index()]
    }

    pub fn join_worker(&self, id: JoinId) -> &JoinWorker {
        &self.joins[id.index()]
    }

    /// The tree's main search context; scratch contexts used during
    /// extra-condition replay are never observable from outside.
    pub fn main_context(&self) -> &SearchContext<B::Fragment> {
        &self.main
    }

    pub fn delimiter_depth(&self) -> u32 {
        self.delimiter_depth
    }

    pub fn set_auto_chain(&mut self, connective: Option<Connective>) {
        self.auto_chain = connective;
    }

    pub fn auto_chain(&self) -> Option<Connective> {
        self.auto_chain
    }

    /// Overrides the side-symbol pair recognized in extra-condition texts.
    /// Defaults to `$FROM.` / `$TO.`.
    pub fn set_side_symbols(&mut self, origin: impl Into<String>, target: impl Into<String>) {
        self.side_origin = origin.into();
        self.side_target = target.into();
    }

    pub fn side_symbols(&self) -> (&str, &str) {
        (&self.side_origin, &self.side_target)
    }

    pub fn set_page(&mut self, page: u32, page_size: u32) {
        self.page = Some(Pagination { page, page_size });
    }

    pub fn clear_page(&mut self) {
        self.page = None;
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.page
    }

    // ---- construction internals (driven by NodeBuilder) ----

    pub(crate) fn new_param(
        &mut self,
        class_name: String,
        kind: ParamKind,
        path: Option<String>,
        parent: Option<ParamId>,
    ) -> ParamId {
        let id = ParamId::new(self.params.len());
        self.params.push(Parameter::new(class_name, kind, path, parent));
        id
    }

    pub(crate) fn populate_node<I: TreeInitializer<B>>(
        &mut self,
        initializer: &I,
        param: ParamId,
        class: &str,
    ) -> Result<()> {
        if self.building_stack.iter().any(|c| c == class) {
            return Err(QueryError::CyclicJoin(class.to_string()));
        }
        self.building_stack.push(class.to_string());
        let outcome = {
            let mut builder = NodeBuilder {
                ctx: self,
                param,
                initializer,
            };
            initializer.populate(&mut builder, class)
        };
        self.building_stack.pop();
        outcome?;
        let p = &mut self.params[param.index()];
        if p.table_name.is_empty() {
            p.table_name = class.to_string();
        }
        if p.alias_base.is_empty() {
            p.alias_base = default_alias_base(&p.table_name);
        }
        trace!(
            class,
            kind = p.kind.label(),
            fields = p.fields.len(),
            "populated parameter node"
        );
        Ok(())
    }

    pub(crate) fn find_own_field(&self, param: ParamId, name: &str) -> Option<FieldId> {
        self.params[param.index()]
            .fields
            .iter()
            .copied()
            .find(|f| self.fields[f.index()].name == name)
    }

    pub(crate) fn add_field(&mut self, param: ParamId, cfg: FieldConfig) -> Result<FieldId> {
        let duplicate = self.params[param.index()]
            .fields
            .iter()
            .any(|f| self.fields[f.index()].name == cfg.name);
        if duplicate {
            return Err(QueryError::DuplicateField(cfg.name));
        }
        let id = FieldId::new(self.fields.len());
        self.fields.push(cfg.into_field(param));
        let p = &mut self.params[param.index()];
        p.fields.push(id);
        p.owned_fields.push(id);
        Ok(id)
    }

    pub(crate) fn add_searcher(&mut self, param: ParamId, field_name: &str) -> Result<SearcherId> {
        let fid = self
            .find_own_field(param, field_name)
            .ok_or_else(|| QueryError::FieldNotOwned(field_name.to_string()))?;
        let id = SearcherId::new(self.searchers.len());
        let path = self.searcher_path(param, field_name);
        self.searchers.push(SearcherNode {
            field: fid,
            owner: param,
            path: path.clone(),
        });
        self.fields[fid.index()].searcher = Some(id);
        let p = &mut self.params[param.index()];
        p.searchers.push(id);
        p.owned_searchers.push(id);
        if let Some(path) = path {
            self.searchers_by_path.insert(path, id);
        }
        Ok(id)
    }

    /// Canonical searcher path. Inherit-joined and dynamic nodes yield none:
    /// their searchers are reachable only by reference or relative walk.
    fn searcher_path(&self, param: ParamId, field_name: &str) -> Option<String> {
        let p = &self.params[param.index()];
        match (p.kind, &p.path) {
            (ParamKind::Root | ParamKind::DefaultJoin, Some(prefix)) => {
                if prefix.is_empty() {
                    Some(field_name.to_string())
                } else {
                    Some(format!("{prefix}.{field_name}"))
                }
            }
            _ => None,
        }
    }

    pub(crate) fn add_join(&mut self, worker: JoinWorker) -> JoinId {
        let id = JoinId::new(self.joins.len());
        self.joins.push(worker);
        id
    }

    pub(crate) fn register_param_path(&mut self, path: String, param: ParamId) {
        self.params_by_path.insert(path, param);
    }

    /// Copies an inherit-joined node's own fields and searchers into each
    /// ancestor along the inherit chain, so an inheriting node presents the
    /// flattened column set. Deeper inherit descendants have already walked
    /// through this node when they were registered.
    pub(crate) fn flatten_inherited(&mut self, child: ParamId) {
        let own_fields = self.params[child.index()].fields.clone();
        let own_searchers = self.params[child.index()].searchers.clone();
        let mut cursor = self.params[child.index()].parent;
        while let Some(p) = cursor {
            let param = &mut self.params[p.index()];
            param.owned_fields.extend(own_fields.iter().copied());
            param.owned_searchers.extend(own_searchers.iter().copied());
            if param.kind == ParamKind::InheritJoin {
                cursor = param.parent;
            } else {
                break;
            }
        }
    }

    /// Assigns every parameter a globally unique table alias by appending a
    /// strictly increasing counter to its alias base. Runs once per tree.
    pub(crate) fn finalize_aliases(&mut self) {
        if self.aliases_assigned {
            return;
        }
        for p in &mut self.params {
            self.alias_counter += 1;
            p.table_alias = format!("{}{}", p.alias_base, self.alias_counter);
        }
        self.aliases_assigned = true;
        debug!(count = self.params.len(), "assigned table aliases");
    }

    // ---- path resolution & reachability ----

    /// Resolves a canonical path from the root, registry first.
    pub fn parameter(&self, path: &str) -> Option<ParamId> {
        if let Some(p) = self.params_by_path.get(path) {
            return Some(*p);
        }
        self.get_parameter_from(self.root(), path)
    }

    /// Resolves a canonical searcher path from the root, registry first.
    pub fn find_searcher(&self, path: &str) -> Option<SearcherId> {
        if let Some(s) = self.searchers_by_path.get(path) {
            return Some(*s);
        }
        self.get_searcher_from(self.root(), path)
    }

    /// Walks a dot-path relative to `start` through the default-join maps.
    /// Empty and `this` segments resolve to the start node itself.
    pub fn get_parameter_from(&self, start: ParamId, path: &str) -> Option<ParamId> {
        let mut cur = start;
        for seg in path_segments(path) {
            cur = self.default_child_by_field_name(cur, seg)?;
        }
        Some(cur)
    }

    /// Like [`Self::get_parameter_from`], but the final segment resolves to a
    /// searcher in the owned set (which includes inherited contributions).
    pub fn get_searcher_from(&self, start: ParamId, path: &str) -> Option<SearcherId> {
        let segments = path_segments(path);
        let (last, init) = segments.split_last()?;
        let mut cur = start;
        for seg in init {
            cur = self.default_child_by_field_name(cur, seg)?;
        }
        self.params[cur.index()]
            .owned_searchers
            .iter()
            .copied()
            .find(|s| self.fields[self.searchers[s.index()].field.index()].name == *last)
    }

    /// Default-joined child whose origin field carries this name. Inherit
    /// children are transparent: their default joins count as ours.
    fn default_child_by_field_name(&self, param: ParamId, name: &str) -> Option<ParamId> {
        let p = &self.params[param.index()];
        for &(of, child) in &p.default_joins {
            if self.fields[of.index()].name == name {
                return Some(child);
            }
        }
        for &(_, inherited) in &p.inherit_joins {
            if let Some(child) = self.default_child_by_field_name(inherited, name) {
                return Some(child);
            }
        }
        None
    }

    /// A mutable searcher handle for a canonical path.
    pub fn searcher(&mut self, path: &str) -> Result<Searcher<'_, B>> {
        let id = self
            .find_searcher(path)
            .ok_or_else(|| QueryError::UnknownPath(path.to_string()))?;
        Ok(Searcher { ctx: self, id })
    }

    pub fn searcher_by_id(&mut self, id: SearcherId) -> Searcher<'_, B> {
        Searcher { ctx: self, id }
    }

    /// A connective handle anchored on an arbitrary searcher of `param`, for
    /// `and`/`or`/delimiters when no specific field is a natural anchor.
    pub fn above(&mut self, param: ParamId) -> Result<Searcher<'_, B>> {
        let id = self.params[param.index()]
            .owned_searchers
            .first()
            .copied()
            .ok_or(QueryError::NoAnchor)?;
        Ok(Searcher { ctx: self, id })
    }

    pub fn is_my_parameter(&self, me: ParamId, other: ParamId) -> bool {
        self.params[me.index()].all_children().any(|(_, c)| c == other)
    }

    pub fn is_my_searcher(&self, me: ParamId, searcher: SearcherId) -> bool {
        self.params[me.index()].owned_searchers.contains(&searcher)
    }

    pub fn is_reachable_parameter(&self, me: ParamId, other: ParamId) -> bool {
        self.reachable_params(me).contains(&other)
    }

    pub fn is_reachable_searcher(&self, me: ParamId, searcher: SearcherId) -> bool {
        if searcher.index() >= self.searchers.len() {
            return false;
        }
        self.is_reachable_parameter(me, self.searchers[searcher.index()].owner)
    }

    /// Every parameter transitively connected to `start` through default,
    /// inherit and dynamic joins, `start` included.
    pub fn reachable_params(&self, start: ParamId) -> Vec<ParamId> {
        let mut out = vec![start];
        let mut i = 0;
        while i < out.len() {
            let p = out[i];
            i += 1;
            for (_, child) in self.params[p.index()].all_children() {
                if !out.contains(&child) {
                    out.push(child);
                }
            }
        }
        out
    }

    // ---- join-origin indirection ----

    /// Follows join-origin indirection: while the field is the origin of a
    /// materialized join, the operative representative is that join's target
    /// field. Rendered column references always point at the real joined-in
    /// column, never a ghost origin column.
    pub fn actual_field(&self, field: FieldId) -> FieldId {
        let mut cur = field;
        loop {
            let fld = &self.fields[cur.index()];
            if !fld.join_origin {
                return cur;
            }
            let owner = &self.params[fld.owner.index()];
            let mut next = None;
            for (of, child) in owner.all_children() {
                if of != cur {
                    continue;
                }
                if let Some(j) = self.params[child.index()].using_join {
                    if self.joins[j.index()].materialized {
                        next = Some(self.joins[j.index()].target_field);
                        break;
                    }
                }
            }
            match next {
                Some(target) => cur = target,
                None => return cur,
            }
        }
    }

    /// Rendered `alias.column` reference for a field.
    pub fn aliased_column(&self, field: FieldId) -> String {
        let fld = &self.fields[field.index()];
        format!("{}.{}", self.params[fld.owner.index()].table_alias, fld.column)
    }

    // ---- searcher operation support ----

    /// Resolves the operative field, flags usage, and materializes the owning
    /// parameter's incoming join. Runs before any fragment is recorded.
    fn prepare_search(&mut self, searcher: SearcherId, mark_searched: bool) -> Result<FieldId> {
        let declared = self.searchers[searcher.index()].field;
        let actual = self.actual_field(declared);
        let owner = self.fields[actual.index()].owner;
        if mark_searched {
            self.fields[actual.index()].searched = true;
            self.params[owner.index()].has_field_searched = true;
        }
        if let Some(j) = self.params[owner.index()].using_join {
            self.do_join_work(j)?;
        }
        Ok(actual)
    }

    fn active(&self) -> &SearchContext<B::Fragment> {
        self.scratch.last().unwrap_or(&self.main)
    }

    fn active_mut(&mut self) -> &mut SearchContext<B::Fragment> {
        if let Some(s) = self.scratch.last_mut() {
            s
        } else {
            &mut self.main
        }
    }

    /// Retraction can strand connectives with nothing on one side, including
    /// one anchored on a searcher other than the cancelled one. Prune them
    /// and re-derive whether the stream owes a connective from whatever entry
    /// now ends it.
    fn recompute_connective_state(&mut self) {
        self.active_mut().prune_dangling_connectives();
        self.needs_connective = matches!(
            self.active().last_where_role(),
            Some(FragmentRole::Condition | FragmentRole::CloseDelimiter)
        );
    }

    /// Records one search fragment, enforcing the connective-sequencing
    /// invariant: a second condition without an intervening connective fails,
    /// unless auto-chaining injects the configured default.
    fn add_search_entry(&mut self, searcher: SearcherId, fragment: B::Fragment) -> Result<()> {
        if self.needs_connective {
            match self.auto_chain {
                Some(c) => {
                    let chained = match c {
                        Connective::And => self.backend.on_and(),
                        Connective::Or => self.backend.on_or(),
                    };
                    self.active_mut().push(
                        EntryKey::Where,
                        EntryOrigin::Searcher(searcher),
                        FragmentRole::Connective,
                        chained,
                    );
                    self.needs_connective = false;
                }
                None => return Err(QueryError::MissingConnective),
            }
        }
        self.active_mut().push(
            EntryKey::Where,
            EntryOrigin::Searcher(searcher),
            FragmentRole::Condition,
            fragment,
        );
        self.needs_connective = true;
        Ok(())
    }

    fn apply_op_internal(
        &mut self,
        searcher: SearcherId,
        op: CompareOp,
        values: Vec<B::Value>,
        mark_searched: bool,
    ) -> Result<()> {
        let actual = self.prepare_search(searcher, mark_searched)?;
        let column = self.aliased_column(actual);
        let operand = if op.is_nullary() {
            Operand::None
        } else {
            Operand::Values(values)
        };
        let fragment = self.backend.on_search(op, &column, operand);
        self.add_search_entry(searcher, fragment)
    }

    pub(crate) fn apply_value_op(
        &mut self,
        searcher: SearcherId,
        op: CompareOp,
        values: Vec<B::Value>,
    ) -> Result<()> {
        self.apply_op_internal(searcher, op, values, true)
    }

    /// Field-to-field comparison: both sides resolve and materialize, and the
    /// fragment is rendered over two column references, no bound literal.
    pub(crate) fn apply_searcher_op(
        &mut self,
        searcher: SearcherId,
        op: CompareOp,
        other: SearcherId,
    ) -> Result<()> {
        let actual = self.prepare_search(searcher, true)?;
        let other_actual = self.prepare_search(other, true)?;
        let column = self.aliased_column(actual);
        let other_column = self.aliased_column(other_actual);
        let fragment = self
            .backend
            .on_search(op, &column, Operand::Column(&other_column));
        self.add_search_entry(searcher, fragment)
    }

    pub(crate) fn apply_child_query(
        &mut self,
        searcher: SearcherId,
        op: CompareOp,
        output: B::Output,
    ) -> Result<()> {
        let actual = self.prepare_search(searcher, true)?;
        let column = self.aliased_column(actual);
        let fragment = self.backend.on_search(op, &column, Operand::Query(&output));
        self.add_search_entry(searcher, fragment)
    }

    /// Textual search: the literal goes through the field's registered
    /// transformer before it becomes a bound value.
    pub(crate) fn apply_text_op(
        &mut self,
        searcher: SearcherId,
        op: CompareOp,
        raw: &str,
    ) -> Result<()> {
        let values = self.text_args(searcher, op, Some(raw))?;
        self.apply_op_internal(searcher, op, values, true)
    }

    fn text_args(
        &self,
        searcher: SearcherId,
        op: CompareOp,
        raw: Option<&str>,
    ) -> Result<Vec<B::Value>> {
        if op.is_nullary() {
            return Ok(Vec::new());
        }
        let raw = raw.ok_or(QueryError::BadArity {
            method: op.method_name(),
            expected: 1,
            got: 0,
        })?;
        let fid = self.searchers[searcher.index()].field;
        let transformer = self
            .transformers
            .get(self.fields[fid.index()].value_type.as_str())?;
        if op.takes_list() {
            let values = raw
                .split(',')
                .map(|a| transformer.string_to_value(a.trim()))
                .collect::<Result<Vec<_>>>()?;
            if op == CompareOp::Between && values.len() != 2 {
                return Err(QueryError::BadArity {
                    method: op.method_name(),
                    expected: 2,
                    got: values.len(),
                });
            }
            Ok(values)
        } else {
            Ok(vec![transformer.string_to_value(raw.trim())?])
        }
    }

    /// Connective operator. At most one connective is owed per unresolved
    /// expression; a second call before the next condition is a no-op.
    pub(crate) fn apply_connective(
        &mut self,
        searcher: SearcherId,
        connective: Connective,
    ) -> Result<()> {
        if !self.needs_connective {
            return Ok(());
        }
        let fragment = match connective {
            Connective::And => self.backend.on_and(),
            Connective::Or => self.backend.on_or(),
        };
        self.active_mut().push(
            EntryKey::Where,
            EntryOrigin::Searcher(searcher),
            FragmentRole::Connective,
            fragment,
        );
        self.needs_connective = false;
        Ok(())
    }

    pub(crate) fn delimiter_start(&mut self, searcher: SearcherId) -> Result<()> {
        let fragment = self.backend.on_delimiter_start();
        self.active_mut().push(
            EntryKey::Where,
            EntryOrigin::Searcher(searcher),
            FragmentRole::OpenDelimiter,
            fragment,
        );
        self.delimiter_depth += 1;
        Ok(())
    }

    pub(crate) fn delimiter_end(&mut self, searcher: SearcherId) -> Result<()> {
        if self.delimiter_depth == 0 {
            return Err(QueryError::UnbalancedDelimiter(
                "closing a group that was never opened".to_string(),
            ));
        }
        let fragment = self.backend.on_delimiter_end();
        self.active_mut().push(
            EntryKey::Where,
            EntryOrigin::Searcher(searcher),
            FragmentRole::CloseDelimiter,
            fragment,
        );
        self.delimiter_depth -= 1;
        Ok(())
    }

    pub(crate) fn set_output(&mut self, searcher: SearcherId, on: bool) -> Result<()> {
        if on {
            let actual = self.prepare_search(searcher, false)?;
            self.fields[actual.index()].output = true;
        } else {
            let declared = self.searchers[searcher.index()].field;
            let actual = self.actual_field(declared);
            self.fields[declared.index()].output = false;
            self.fields[actual.index()].output = false;
            let owner = self.fields[actual.index()].owner;
            if let Some(j) = self.params[owner.index()].using_join {
                self.cancel_join_work(j, false, true);
            }
        }
        Ok(())
    }

    pub(crate) fn mark_order_by(
        &mut self,
        searcher: SearcherId,
        priority: u32,
        ascending: bool,
    ) -> Result<()> {
        let actual = self.prepare_search(searcher, false)?;
        self.fields[actual.index()].sort = Some(SortMark {
            priority,
            ascending,
        });
        Ok(())
    }

    pub(crate) fn mark_group_by(&mut self, searcher: SearcherId, priority: u32) -> Result<()> {
        let actual = self.prepare_search(searcher, false)?;
        self.fields[actual.index()].group = Some(GroupMark { priority });
        Ok(())
    }

    /// Removes this searcher's fragments, clears its searched marks, and
    /// attempts an upstream join rollback when nothing under the owning
    /// parameter is searched anymore.
    pub(crate) fn cancel_search(&mut self, searcher: SearcherId) {
        let declared = self.searchers[searcher.index()].field;
        let actual = self.actual_field(declared);
        self.active_mut().remove_by_searcher(searcher);
        self.fields[declared.index()].searched = false;
        self.fields[actual.index()].searched = false;
        let owner = self.fields[actual.index()].owner;
        let still_searched = self.params[owner.index()]
            .owned_fields
            .iter()
            .any(|f| self.fields[f.index()].searched);
        if !still_searched {
            self.params[owner.index()].has_field_searched = false;
        }
        if let Some(j) = self.params[owner.index()].using_join {
            self.cancel_join_work(j, false, true);
        }
        self.recompute_connective_state();
    }

    // ---- join engine ----

    /// Materializes one join edge: parent edges first (so the compiled order
    /// is always root-to-leaf), then the extra condition if the edge carries
    /// one, then the backend's join fragment.
    ///
    /// Join fragments always land in the main context, even when replay is
    /// running inside a scratch one: a dotted path in an extra condition may
    /// materialize deeper edges, and those must join the FROM chain as
    /// standalone entries, not dissolve into the ON text. The slot reserved
    /// before replay keeps this edge's fragment ahead of the edges its extra
    /// condition pulled in.
    pub fn do_join_work(&mut self, join: JoinId) -> Result<()> {
        if self.joins[join.index()].materialized {
            return Ok(());
        }
        let origin_param = self.joins[join.index()].origin_param;
        if let Some(parent) = self.params[origin_param.index()].using_join {
            self.do_join_work(parent)?;
        }
        // Set before replay: the extra condition searches the very fields
        // this edge brings in, and must not re-enter materialization.
        self.joins[join.index()].materialized = true;
        let slot = self.main.len();
        let extra = match self.joins[join.index()].extra_condition.clone() {
            Some(text) => match self.compile_extra(join, &text) {
                Ok(fragment) => Some(fragment),
                Err(e) => {
                    self.joins[join.index()].materialized = false;
                    let scope = self.reachable_params(self.joins[join.index()].target_param);
                    self.rollback_edges_in(&scope, join);
                    return Err(e);
                }
            },
            None => None,
        };
        let fragment = {
            let jw = &self.joins[join.index()];
            let origin = &self.params[jw.origin_param.index()];
            let target = &self.params[jw.target_param.index()];
            let spec = JoinSpec {
                kind: jw.kind,
                relation: jw.relation,
                reversed: jw.reversed,
                origin_table: &origin.table_name,
                origin_alias: &origin.table_alias,
                origin_column: &self.fields[jw.origin_field.index()].column,
                target_table: &target.table_name,
                target_alias: &target.table_alias,
                target_column: &self.fields[jw.target_field.index()].column,
            };
            self.backend.on_join(&spec, extra)
        };
        self.main.insert(
            slot,
            EntryKey::Join,
            EntryOrigin::Join(join),
            FragmentRole::Condition,
            fragment,
        );
        debug!(
            target_class = self.params[self.joins[join.index()].target_param.index()]
                .class_name
                .as_str(),
            "materialized join"
        );
        Ok(())
    }

    /// Compiles and replays a join's extra-condition text inside a scratch
    /// context, then folds the replayed fragments into one. The condition
    /// must close every delimiter group it opens.
    fn compile_extra(&mut self, join: JoinId, text: &str) -> Result<B::Fragment> {
        let symbols = SideSymbols {
            origin: &self.side_origin,
            target: &self.side_target,
        };
        let ops = expr::compile(text, &symbols)?;
        let (origin, target) = {
            let jw = &self.joins[join.index()];
            (jw.origin_param, jw.target_param)
        };
        self.scratch.push(SearchContext::new());
        let saved_needs = std::mem::replace(&mut self.needs_connective, false);
        let saved_depth = std::mem::replace(&mut self.delimiter_depth, 0);
        let replayed = self.replay_ops(&ops, origin, target);
        let replay_depth = self.delimiter_depth;
        let scratch = self.scratch.pop().unwrap_or_default();
        self.needs_connective = saved_needs;
        self.delimiter_depth = saved_depth;
        replayed?;
        if replay_depth != 0 {
            return Err(QueryError::UnbalancedDelimiter(
                "join condition leaves a group open".to_string(),
            ));
        }
        Ok(self.backend.merge_condition(scratch.into_fragments()))
    }

    /// Replays compiled expression records against real searchers. Replay
    /// does not set searched marks: the fragments belong to the join entry,
    /// so rollback accounting must not see phantom usage.
    fn replay_ops(&mut self, ops: &[ExprOp], origin: ParamId, target: ParamId) -> Result<()> {
        for op in ops {
            let side_param = match op.side {
                Some(Side::Origin) => origin,
                Some(Side::Target) | None => target,
            };
            let searcher = self
                .get_searcher_from(side_param, &op.field_path)
                .ok_or_else(|| QueryError::UnknownPath(op.field_path.clone()))?;
            for _ in 0..op.opens {
                self.delimiter_start(searcher)?;
            }
            self.apply_connective(searcher, op.connective)?;
            let values = self.text_args(searcher, op.op, op.raw_args.as_deref())?;
            self.apply_op_internal(searcher, op.op, values, false)?;
            for _ in 0..op.closes {
                self.delimiter_end(searcher)?;
            }
        }
        Ok(())
    }

    /// Rolls a join back unless something below it is still in use.
    ///
    /// The dependency scan covers either only the target node or everything
    /// reachable from it. `force_reset` skips the scan and clears every mark
    /// and fragment in scope first. On success the parent edge is attempted
    /// too, node-locally. Returns whether this edge was rolled back.
    pub fn cancel_join_work(
        &mut self,
        join: JoinId,
        force_reset: bool,
        check_full_reachability: bool,
    ) -> bool {
        if !self.joins[join.index()].materialized {
            return false;
        }
        let target = self.joins[join.index()].target_param;
        let scope: Vec<ParamId> = if check_full_reachability {
            self.reachable_params(target)
        } else {
            vec![target]
        };
        if force_reset {
            self.force_clear_scope(&scope);
        } else {
            for &p in &scope {
                for &f in &self.params[p.index()].owned_fields {
                    if self.fields[f.index()].in_use() {
                        return false;
                    }
                }
            }
            if check_full_reachability {
                // Nothing in scope is in use, so edges below that were held
                // open only by extra-condition replay go with this one.
                self.rollback_edges_in(&scope, join);
            } else if self.joins.iter().enumerate().any(|(i, jw)| {
                JoinId::new(i) != join && jw.materialized && scope.contains(&jw.origin_param)
            }) {
                // Node-local scan cannot see the deeper edge's dependents;
                // a still-materialized edge below pins this one.
                return false;
            }
        }
        self.main.remove_by_join(join);
        self.joins[join.index()].materialized = false;
        debug!(
            target_class = self.params[target.index()].class_name.as_str(),
            forced = force_reset,
            "rolled back join"
        );
        let origin_param = self.joins[join.index()].origin_param;
        if let Some(parent) = self.params[origin_param.index()].using_join {
            self.cancel_join_work(parent, false, false);
        }
        true
    }

    /// Dematerializes every other edge originating inside `scope`, removing
    /// its join fragment from the main stream.
    fn rollback_edges_in(&mut self, scope: &[ParamId], except: JoinId) {
        let edges: Vec<JoinId> = self
            .joins
            .iter()
            .enumerate()
            .filter(|(i, jw)| {
                JoinId::new(*i) != except && jw.materialized && scope.contains(&jw.origin_param)
            })
            .map(|(i, _)| JoinId::new(i))
            .collect();
        for e in edges {
            self.joins[e.index()].materialized = false;
            self.main.remove_by_join(e);
        }
    }

    /// Clears every mark and retracts every fragment contributed below the
    /// given scope, dematerializing child edges as it goes.
    fn force_clear_scope(&mut self, scope: &[ParamId]) {
        for &p in scope {
            let fields = self.params[p.index()].owned_fields.clone();
            for f in fields {
                self.fields[f.index()].clear_marks();
            }
            let searchers = self.params[p.index()].owned_searchers.clone();
            for s in searchers {
                self.main.remove_by_searcher(s);
            }
            self.params[p.index()].has_field_searched = false;
        }
        let child_joins: Vec<JoinId> = self
            .joins
            .iter()
            .enumerate()
            .filter(|(_, jw)| jw.materialized && scope.contains(&jw.origin_param))
            .map(|(i, _)| JoinId::new(i))
            .collect();
        for j in child_joins {
            self.joins[j.index()].materialized = false;
            self.main.remove_by_join(j);
        }
        self.recompute_connective_state();
    }

    /// Clears the whole tree back to its just-initialized state.
    pub fn reset(&mut self) {
        self.main.clear();
        self.scratch.clear();
        for f in &mut self.fields {
            f.clear_marks();
        }
        for p in &mut self.params {
            p.has_field_searched = false;
        }
        for j in &mut self.joins {
            j.materialized = false;
        }
        self.needs_connective = false;
        self.delimiter_depth = 0;
        debug!("reset parameter tree");
    }

    /// Clears everything at and below one parameter, rolling back its
    /// incoming edge unconditionally.
    pub fn reset_parameter(&mut self, param: ParamId) {
        if let Some(j) = self.params[param.index()].using_join {
            self.cancel_join_work(j, true, true);
        } else {
            let scope = self.reachable_params(param);
            self.force_clear_scope(&scope);
        }
    }

    // ---- join type mutation (dynamic edges) ----

    pub fn set_join_kind(&mut self, param: ParamId, kind: JoinKind) -> Result<()> {
        let j = self.mutable_join_of(param)?;
        self.joins[j.index()].kind = kind;
        Ok(())
    }

    pub fn set_join_relation(&mut self, param: ParamId, relation: RelationKind) -> Result<()> {
        let j = self.mutable_join_of(param)?;
        self.joins[j.index()].relation = relation;
        Ok(())
    }

    fn mutable_join_of(&self, param: ParamId) -> Result<JoinId> {
        let p = &self.params[param.index()];
        let j = match p.kind {
            ParamKind::Root | ParamKind::InheritJoin => {
                return Err(QueryError::JoinTypeImmutable(p.kind.label()));
            }
            ParamKind::DefaultJoin | ParamKind::DynamicJoin => {
                p.using_join.ok_or(QueryError::NotDynamicJoin)?
            }
        };
        if self.joins[j.index()].materialized {
            return Err(QueryError::JoinMaterialized(p.class_name.clone()));
        }
        Ok(j)
    }

    /// Flips the rendered operand order of a dynamic edge's key relation.
    /// Edge bookkeeping (origin maps, field markers, tree shape) is
    /// untouched, so path walks and origin indirection stay valid.
    pub fn reverse_join_relation(&mut self, param: ParamId) -> Result<()> {
        let p = &self.params[param.index()];
        if p.kind != ParamKind::DynamicJoin {
            return Err(QueryError::NotDynamicJoin);
        }
        let j = p.using_join.ok_or(QueryError::NotDynamicJoin)?;
        if self.joins[j.index()].materialized {
            return Err(QueryError::JoinMaterialized(p.class_name.clone()));
        }
        self.joins[j.index()].reverse();
        Ok(())
    }

    // ---- dynamic join of two trees ----

    /// Establishes a dynamic join: absorbs `other` (a finished root tree)
    /// into this context, converts its root into a `DynamicJoin` node and
    /// records the edge. `to` must be a searcher owned by the other root.
    ///
    /// The other tree must not yet carry recorded conditions or materialized
    /// edges: its fragments were rendered against aliases that re-aliasing
    /// invalidates. Output, sort and group marks are render-independent and
    /// survive; when any absorbed field carries one, the new edge
    /// materializes immediately so the marked columns have a join to stand
    /// on.
    ///
    /// Absorbed parameters are re-aliased so aliases stay globally unique;
    /// absorbed nodes lose canonical paths and stay reachable only through
    /// the dynamic-join map.
    pub fn join_tree(
        &mut self,
        mut other: ParameterContext<B>,
        kind: Option<JoinKind>,
        relation: Option<RelationKind>,
        from: SearcherId,
        to: SearcherId,
    ) -> Result<ParamId> {
        if from.index() >= self.searchers.len() {
            return Err(QueryError::UnknownPath("from searcher".to_string()));
        }
        if to.index() >= other.searchers.len() {
            return Err(QueryError::UnknownPath("to searcher".to_string()));
        }
        let other_root = other.root();
        if other.params[other_root.index()].kind != ParamKind::Root {
            return Err(QueryError::JoinTargetNotRoot);
        }
        if other.searchers[to.index()].owner != other_root {
            return Err(QueryError::FieldNotOwned(
                other.fields[other.searchers[to.index()].field.index()]
                    .name
                    .clone(),
            ));
        }
        if !other.main.is_empty() || other.joins.iter().any(|j| j.materialized) {
            return Err(QueryError::JoinTargetDirty);
        }

        let param_offset = self.params.len() as u32;
        let field_offset = self.fields.len() as u32;
        let searcher_offset = self.searchers.len() as u32;
        let join_offset = self.joins.len() as u32;

        for mut p in other.params.drain(..) {
            p.offset_ids(param_offset, field_offset, searcher_offset, join_offset);
            p.path = None;
            self.params.push(p);
        }
        for mut f in other.fields.drain(..) {
            f.owner = f.owner.offset(param_offset);
            if let Some(s) = f.searcher.as_mut() {
                *s = s.offset(searcher_offset);
            }
            self.fields.push(f);
        }
        for mut s in other.searchers.drain(..) {
            s.field = s.field.offset(field_offset);
            s.owner = s.owner.offset(param_offset);
            s.path = None;
            self.searchers.push(s);
        }
        for mut jw in other.joins.drain(..) {
            jw.offset_ids(param_offset, field_offset);
            self.joins.push(jw);
        }

        let absorbed = param_offset as usize..self.params.len();
        for i in absorbed {
            self.alias_counter += 1;
            let p = &mut self.params[i];
            p.table_alias = format!("{}{}", p.alias_base, self.alias_counter);
        }

        let dyn_root = ParamId::new(other_root.index() + param_offset as usize);
        let to = to.offset(searcher_offset);
        let origin_param = self.searchers[from.index()].owner;
        let origin_field = self.searchers[from.index()].field;
        let target_field = self.searchers[to.index()].field;

        self.params[dyn_root.index()].kind = ParamKind::DynamicJoin;
        self.params[dyn_root.index()].parent = Some(origin_param);
        let jid = self.add_join(JoinWorker {
            origin_param,
            origin_field,
            target_param: dyn_root,
            target_field,
            kind: kind.unwrap_or(JoinKind::Inner),
            relation: relation.unwrap_or(RelationKind::Eq),
            reversed: false,
            extra_condition: None,
            materialized: false,
        });
        self.params[dyn_root.index()].using_join = Some(jid);
        self.fields[origin_field.index()].join_origin = true;
        self.params[origin_param.index()]
            .dynamic_joins
            .push((origin_field, dyn_root));
        let marks_live = (field_offset as usize..self.fields.len())
            .any(|i| self.fields[i].in_use());
        if marks_live {
            self.do_join_work(jid)?;
        }
        debug!(
            target_class = self.params[dyn_root.index()].class_name.as_str(),
            "absorbed tree through dynamic join"
        );
        Ok(dyn_root)
    }

    // ---- output toggles ----

    /// Toggles output on every searcher reachable from `start`.
    pub fn set_all_field_output(&mut self, start: ParamId, on: bool) -> Result<()> {
        for p in self.reachable_params(start) {
            let searchers = self.params[p.index()].searchers.clone();
            for s in searchers {
                self.set_output(s, on)?;
            }
        }
        Ok(())
    }

    /// Toggles output only on searchers this node owns, inherited included.
    pub fn set_all_my_field_output(&mut self, start: ParamId, on: bool) -> Result<()> {
        let searchers = self.params[start.index()].owned_searchers.clone();
        for s in searchers {
            self.set_output(s, on)?;
        }
        Ok(())
    }

    // ---- build byproducts ----

    /// Output columns in parameter order, rendered `alias.column`.
    pub fn output_columns(&self) -> Vec<OutputColumn> {
        let mut out = Vec::new();
        for p in &self.params {
            for &f in &p.fields {
                let fld = &self.fields[f.index()];
                if fld.output {
                    out.push(OutputColumn {
                        expr: format!("{}.{}", p.table_alias, fld.column),
                        alias: fld.column_alias.clone(),
                    });
                }
            }
        }
        out
    }

    /// Sort-marked columns ordered by priority.
    pub fn sort_columns(&self) -> Vec<(String, SortMark)> {
        let mut out: Vec<(String, SortMark)> = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                f.sort
                    .map(|mark| (self.aliased_column(FieldId::new(i)), mark))
            })
            .collect();
        out.sort_by_key(|(_, m)| m.priority);
        out
    }

    /// Group-marked columns ordered by priority.
    pub fn group_columns(&self) -> Vec<(String, GroupMark)> {
        let mut out: Vec<(String, GroupMark)> = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                f.group
                    .map(|mark| (self.aliased_column(FieldId::new(i)), mark))
            })
            .collect();
        out.sort_by_key(|(_, m)| m.priority);
        out
    }
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "this")
        .collect()
}

/// Initial-letters alias base, e.g. `purchase_order` becomes `po`.
fn default_alias_base(table: &str) -> String {
    let base: String = table
        .split(['_', '-'])
        .filter_map(|word| word.chars().next())
        .collect();
    if base.is_empty() {
        "t".to_string()
    } else {
        base.to_lowercase()
    }
}
