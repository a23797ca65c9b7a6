//! redb table definitions for the shared state store.

use redb::TableDefinition;

/// Leaf values keyed by their normalized `/`-separated path. Values are
/// JSON-serialized scalars; objects are flattened into their leaves.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
