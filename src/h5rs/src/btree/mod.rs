//! B-tree v1 (chunk + symbol-table) and B-tree v2 (link-name index).

pub mod v1;
pub mod v2;
