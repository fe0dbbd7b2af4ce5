//! The ordered, keyed bag of rendered fragments.
//!
//! Searchers and join workers contribute entries as the caller works; entries
//! stay removable by origin so cancelling a search or rolling a join back can
//! retract exactly its own contribution. The final build pulls fragments by
//! key, in recorded order.

use crate::ids::{JoinId, SearcherId};

/// Which clause family an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Where,
    Join,
}

/// Who contributed an entry; the handle rollback removes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    Searcher(SearcherId),
    Join(JoinId),
}

/// Grammatical role of an entry within its clause stream. Retraction uses
/// roles to keep the WHERE stream well formed: a connective is only valid
/// between two condition sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentRole {
    Condition,
    Connective,
    OpenDelimiter,
    CloseDelimiter,
}

#[derive(Debug, Clone)]
pub struct ContentEntry<F> {
    pub key: EntryKey,
    pub origin: EntryOrigin,
    pub role: FragmentRole,
    pub fragment: F,
}

/// Per-tree (or scratch, per-extra-condition) fragment collector.
#[derive(Debug, Clone)]
pub struct SearchContext<F> {
    entries: Vec<ContentEntry<F>>,
}

impl<F> SearchContext<F> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(
        &mut self,
        key: EntryKey,
        origin: EntryOrigin,
        role: FragmentRole,
        fragment: F,
    ) {
        self.entries.push(ContentEntry {
            key,
            origin,
            role,
            fragment,
        });
    }

    /// Inserts at a position saved before later entries were appended. Join
    /// materialization uses this to keep a parent edge's fragment ahead of
    /// edges its extra condition pulled in.
    pub(crate) fn insert(
        &mut self,
        index: usize,
        key: EntryKey,
        origin: EntryOrigin,
        role: FragmentRole,
        fragment: F,
    ) {
        self.entries.insert(
            index,
            ContentEntry {
                key,
                origin,
                role,
                fragment,
            },
        );
    }

    pub fn entries(&self) -> &[ContentEntry<F>] {
        &self.entries
    }

    /// Fragments of one clause family, in recorded order.
    pub fn fragments(&self, key: EntryKey) -> impl Iterator<Item = &F> {
        self.entries
            .iter()
            .filter(move |e| e.key == key)
            .map(|e| &e.fragment)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn remove_by_searcher(&mut self, searcher: SearcherId) {
        self.entries
            .retain(|e| e.origin != EntryOrigin::Searcher(searcher));
    }

    pub(crate) fn remove_by_join(&mut self, join: JoinId) {
        self.entries.retain(|e| e.origin != EntryOrigin::Join(join));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes connectives left stranded by retraction: one with no condition
    /// before it, and any left trailing the stream.
    pub(crate) fn prune_dangling_connectives(&mut self) {
        let mut prev: Option<FragmentRole> = None;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].key != EntryKey::Where {
                i += 1;
                continue;
            }
            let role = self.entries[i].role;
            if role == FragmentRole::Connective
                && !matches!(
                    prev,
                    Some(FragmentRole::Condition | FragmentRole::CloseDelimiter)
                )
            {
                self.entries.remove(i);
                continue;
            }
            prev = Some(role);
            i += 1;
        }
        while let Some(pos) = self
            .entries
            .iter()
            .rposition(|e| e.key == EntryKey::Where)
        {
            if self.entries[pos].role == FragmentRole::Connective {
                self.entries.remove(pos);
            } else {
                break;
            }
        }
    }

    /// Role of the last WHERE entry, if any.
    pub(crate) fn last_where_role(&self) -> Option<FragmentRole> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == EntryKey::Where)
            .map(|e| e.role)
    }

    /// Consumes the context, yielding fragments in order. Used to fold a
    /// scratch context into a single extra-condition fragment.
    pub(crate) fn into_fragments(self) -> Vec<F> {
        self.entries.into_iter().map(|e| e.fragment).collect()
    }
}

impl<F> Default for SearchContext<F> {
    fn default() -> Self {
        Self::new()
    }
}
