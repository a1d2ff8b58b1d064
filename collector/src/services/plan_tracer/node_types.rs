//! Plan node type tags and their display labels
//!
//! Tags follow the traced database's plan-node numbering, where the abstract
//! `Plan` tag is 100 and concrete operators follow in declaration order.
//! Labels are the operator names the database prints in EXPLAIN output.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const T_PLAN: i32 = 100;
pub const T_RESULT: i32 = 101;
pub const T_MODIFY_TABLE: i32 = 102;
pub const T_APPEND: i32 = 103;
pub const T_MERGE_APPEND: i32 = 104;
pub const T_RECURSIVE_UNION: i32 = 105;
pub const T_BITMAP_AND: i32 = 106;
pub const T_BITMAP_OR: i32 = 107;
pub const T_SCAN: i32 = 108;
pub const T_SEQ_SCAN: i32 = 109;
pub const T_SAMPLE_SCAN: i32 = 110;
pub const T_INDEX_SCAN: i32 = 111;
pub const T_INDEX_ONLY_SCAN: i32 = 112;
pub const T_BITMAP_INDEX_SCAN: i32 = 113;
pub const T_BITMAP_HEAP_SCAN: i32 = 114;
pub const T_TID_SCAN: i32 = 115;
pub const T_SUBQUERY_SCAN: i32 = 116;
pub const T_FUNCTION_SCAN: i32 = 117;
pub const T_VALUES_SCAN: i32 = 118;
pub const T_CTE_SCAN: i32 = 119;
pub const T_WORK_TABLE_SCAN: i32 = 120;
pub const T_FOREIGN_SCAN: i32 = 121;
pub const T_CUSTOM_SCAN: i32 = 122;
pub const T_JOIN: i32 = 123;
pub const T_NEST_LOOP: i32 = 124;
pub const T_MERGE_JOIN: i32 = 125;
pub const T_HASH_JOIN: i32 = 126;
pub const T_MATERIAL: i32 = 127;
pub const T_SORT: i32 = 128;
pub const T_GROUP: i32 = 129;
pub const T_AGG: i32 = 130;
pub const T_WINDOW_AGG: i32 = 131;
pub const T_UNIQUE: i32 = 132;
pub const T_GATHER: i32 = 133;
pub const T_HASH: i32 = 134;
pub const T_SET_OP: i32 = 135;
pub const T_LOCK_ROWS: i32 = 136;
pub const T_LIMIT: i32 = 137;

static NODE_TYPE_LABELS: Lazy<HashMap<i32, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (T_RESULT, "Result"),
        (T_MODIFY_TABLE, "ModifyTable"),
        (T_APPEND, "Append"),
        (T_MERGE_APPEND, "Merge Append"),
        (T_RECURSIVE_UNION, "Recursive Union"),
        (T_BITMAP_AND, "BitmapAnd"),
        (T_BITMAP_OR, "BitmapOr"),
        (T_SEQ_SCAN, "Seq Scan"),
        (T_SAMPLE_SCAN, "Sample Scan"),
        (T_INDEX_SCAN, "Index Scan"),
        (T_INDEX_ONLY_SCAN, "Index Only Scan"),
        (T_BITMAP_INDEX_SCAN, "Bitmap Index Scan"),
        (T_BITMAP_HEAP_SCAN, "Bitmap Heap Scan"),
        (T_TID_SCAN, "Tid Scan"),
        (T_SUBQUERY_SCAN, "Subquery Scan"),
        (T_FUNCTION_SCAN, "Function Scan"),
        (T_VALUES_SCAN, "Values Scan"),
        (T_CTE_SCAN, "CTE Scan"),
        (T_WORK_TABLE_SCAN, "WorkTable Scan"),
        (T_FOREIGN_SCAN, "Foreign Scan"),
        (T_CUSTOM_SCAN, "Custom Scan"),
        (T_NEST_LOOP, "Nested Loop"),
        (T_MERGE_JOIN, "Merge Join"),
        (T_HASH_JOIN, "Hash Join"),
        (T_MATERIAL, "Materialize"),
        (T_SORT, "Sort"),
        (T_GROUP, "Group"),
        (T_AGG, "Aggregate"),
        (T_WINDOW_AGG, "WindowAgg"),
        (T_UNIQUE, "Unique"),
        (T_GATHER, "Gather"),
        (T_HASH, "Hash"),
        (T_SET_OP, "SetOp"),
        (T_LOCK_ROWS, "LockRows"),
        (T_LIMIT, "Limit"),
    ])
});

/// Display label for a node type code; empty when the code is abstract or unknown
pub fn node_type_label(code: i32) -> &'static str {
    NODE_TYPE_LABELS.get(&code).copied().unwrap_or("")
}
