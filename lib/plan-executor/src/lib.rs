//! Execution engine for pre-compiled federation plans.
//!
//! A request arrives as a plan tree plus a [`Context`]; the [`Executor`]
//! walks the plan, dispatches fetches to the registered data sources,
//! projects the response buffers and writes a single JSON document. For
//! subscriptions, [`stream::execute_stream`] keeps emitting documents until
//! the request is cancelled or an upstream closes the stream.

pub mod arguments;
pub mod context;
pub mod datasources;
pub mod error;
pub mod execution_request;
pub mod executor;
mod json_writer;
pub mod plan;
pub mod projection;
pub mod stream;
mod template;

pub use arguments::{
    resolve_arguments, Argument, ContextVariableArgument, ListArgument, ObjectVariableArgument,
    ResolvedArgs, StaticVariableArgument,
};
pub use context::Context;
pub use datasources::{DataSource, DataSourceMap, Instruction};
pub use error::{DataSourceError, ExecutionError, GraphQLError};
pub use execution_request::GraphQLRequest;
pub use executor::Executor;
pub use plan::{
    DataSourceInvocation, Fetch, FieldNode, ListFilter, ListNode, ObjectNode, OperationType,
    ParallelFetch, PlanNode, SingleFetch, SkipCondition, ValueNode,
};
pub use stream::execute_stream;
