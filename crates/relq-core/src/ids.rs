//! Opaque handles into the arenas owned by a [`crate::context::ParameterContext`].
//!
//! Parameters, fields, searchers and join edges cross-reference each other
//! freely; storing indices instead of references keeps the graph navigable
//! without ownership cycles.

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn offset(self, by: u32) -> Self {
                Self(self.0 + by)
            }
        }
    };
}

arena_id!(
    /// Handle to a parameter node (one mapped table occurrence).
    ParamId
);
arena_id!(
    /// Handle to a field (one column of a parameter).
    FieldId
);
arena_id!(
    /// Handle to a searcher (the per-field query handle).
    SearcherId
);
arena_id!(
    /// Handle to a join edge between two parameters.
    JoinId
);
