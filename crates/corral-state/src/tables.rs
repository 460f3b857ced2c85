//! redb table definitions.
//!
//! Keys are group ids; values are JSON-serialized records.

use redb::TableDefinition;

/// Group id → `ContainerGroupMeta` (JSON).
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");
