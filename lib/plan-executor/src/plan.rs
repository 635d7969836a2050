//! The pre-compiled plan tree.
//!
//! Plans arrive from the planner as data and are immutable during
//! execution. Every node is a tagged variant carrying only the fields that
//! variant has; plans round-trip through JSON with a `kind` discriminator
//! per node and per argument. Field entries only occur inside an object's
//! `fields` list and are structurally distinguished, so they carry no tag.

use serde::{Deserialize, Serialize};

use crate::arguments::Argument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlanNode {
    Object(ObjectNode),
    Value(ValueNode),
    List(ListNode),
}

impl Default for PlanNode {
    fn default() -> Self {
        PlanNode::Value(ValueNode::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    #[default]
    Query,
    Mutation,
    Subscription,
}

/// An object producer. `path` narrows the current data buffer before any
/// child sees it; `fetch` populates the named buffers that resolver fields
/// switch to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectNode {
    pub path: Vec<String>,
    pub fetch: Option<Fetch>,
    pub fields: Vec<FieldNode>,
    pub operation_type: OperationType,
}

/// A named output key. With `has_resolver` set, the current data buffer is
/// swapped to the enclosing fetch's buffer of the same name before the
/// inner value resolves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldNode {
    pub name: String,
    pub value: PlanNode,
    pub has_resolver: bool,
    pub skip: Option<SkipCondition>,
}

/// A leaf scalar projection. `quote_value` wraps the projected bytes in
/// quotes on emission (string fields); numbers and booleans emit raw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueNode {
    pub path: Vec<String>,
    pub quote_value: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListNode {
    pub path: Vec<String>,
    pub value: Box<PlanNode>,
    pub filter: Option<ListFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ListFilter {
    FirstN { n: usize },
}

/// Field-level skip predicate. Both operands resolve to bytes against the
/// current data buffer and compare byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkipCondition {
    IfEqual { left: Argument, right: Argument },
    IfNotEqual { left: Argument, right: Argument },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fetch {
    Single(SingleFetch),
    Parallel(ParallelFetch),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleFetch {
    pub buffer_name: String,
    pub source: DataSourceInvocation,
}

/// Fans the inner fetches out concurrently; their buffers commit in
/// declaration order before any field below the object resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelFetch {
    pub fetches: Vec<SingleFetch>,
}

/// A data source reference by registry name plus the declarative arguments
/// to resolve for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInvocation {
    pub data_source: String,
    #[serde(default)]
    pub args: Vec<Argument>,
}
