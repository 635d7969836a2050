use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use futures::{future::BoxFuture, FutureExt};
use tracing::{instrument, warn};

use crate::{
    arguments::{resolve_arguments, Argument},
    context::Context,
    datasources::{DataSourceMap, Instruction},
    error::{ExecutionError, GraphQLError},
    json_writer,
    plan::{
        Fetch, ListFilter, ListNode, ObjectNode, PlanNode, SingleFetch, SkipCondition, ValueNode,
    },
    projection,
};

/// Walks a plan tree and writes exactly one JSON document to `out`.
///
/// One executor drives one request at a time; for subscriptions the same
/// executor is re-invoked per frame. All named buffers are request-scoped
/// and dropped when `execute` returns. Data-shape mismatches never abort
/// the walk: absent data renders as `null` and fetch failures surface as
/// response-level error entries, keeping the document shape intact.
pub struct Executor {
    data_sources: Arc<DataSourceMap>,
    errors: Vec<GraphQLError>,
    instructions: Vec<Instruction>,
}

impl Executor {
    pub fn new(data_sources: Arc<DataSourceMap>) -> Self {
        Executor {
            data_sources,
            errors: Vec::new(),
            instructions: Vec::new(),
        }
    }

    #[instrument(level = "debug", skip_all, name = "Executor::execute")]
    pub async fn execute(
        &mut self,
        ctx: &Context,
        plan: &ObjectNode,
        out: &mut Vec<u8>,
    ) -> Result<Vec<Instruction>, ExecutionError> {
        self.errors.clear();
        self.instructions.clear();
        if ctx.is_cancelled() {
            return Ok(vec![Instruction::CloseConnection]);
        }
        self.resolve_object(ctx, plan, None, out, true).await?;
        Ok(std::mem::take(&mut self.instructions))
    }

    fn resolve_node<'a>(
        &'a mut self,
        ctx: &'a Context,
        node: &'a PlanNode,
        data: Option<&'a [u8]>,
        out: &'a mut Vec<u8>,
    ) -> BoxFuture<'a, Result<(), ExecutionError>> {
        async move {
            match node {
                PlanNode::Object(object) => self.resolve_object(ctx, object, data, out, false).await,
                PlanNode::Value(value) => {
                    Self::resolve_value(value, data, out);
                    Ok(())
                }
                PlanNode::List(list) => self.resolve_list(ctx, list, data, out).await,
            }
        }
        .boxed()
    }

    async fn resolve_object(
        &mut self,
        ctx: &Context,
        object: &ObjectNode,
        data: Option<&[u8]>,
        out: &mut Vec<u8>,
        root: bool,
    ) -> Result<(), ExecutionError> {
        if object.fetch.is_none() {
            if let Some(field) = object.fields.iter().find(|field| field.has_resolver) {
                return Err(ExecutionError::MalformedPlan(format!(
                    "field \"{}\" expects a buffer but the enclosing object declares no fetch",
                    field.name
                )));
            }
        }

        let mut projected: Option<Bytes> = None;
        let current: Option<&[u8]> = if object.path.is_empty() {
            data
        } else {
            projected = data
                .and_then(|data| projection::select(data, &object.path))
                .map(|(raw, _)| raw);
            projected.as_deref()
        };

        if current.is_none() && object.fetch.is_none() && !root {
            out.extend_from_slice(b"null");
            return Ok(());
        }

        let mut buffers: HashMap<String, Vec<u8>> = HashMap::new();
        if let Some(fetch) = &object.fetch {
            self.resolve_fetch(ctx, fetch, current, &mut buffers, root)
                .await?;
        }

        out.push(b'{');
        let mut written = false;
        for field in &object.fields {
            if let Some(skip) = &field.skip {
                if Self::should_skip(skip, ctx, current) {
                    continue;
                }
            }
            let field_data: Option<&[u8]> = if field.has_resolver {
                match buffers.get(field.name.as_str()) {
                    Some(buffer) => Some(buffer.as_slice()),
                    None => return Err(ExecutionError::MissingBuffer(field.name.clone())),
                }
            } else {
                current
            };
            if written {
                out.push(b',');
            }
            json_writer::write_and_escape_string(out, &field.name);
            out.push(b':');
            self.resolve_node(ctx, &field.value, field_data, out).await?;
            written = true;
        }
        if root && !self.errors.is_empty() {
            if written {
                out.push(b',');
            }
            out.extend_from_slice(b"\"errors\":");
            let errors = sonic_rs::to_vec(&self.errors).unwrap_or_else(|_| b"[]".to_vec());
            out.extend_from_slice(&errors);
        }
        out.push(b'}');
        Ok(())
    }

    /// Runs the object's fetch and commits the named buffers. Parallel
    /// fetches dispatch concurrently but commit in declaration order, so a
    /// slow sibling never reorders buffers. A failed child leaves an empty
    /// buffer (its fields render as `null`) and an error entry; only a
    /// failing single fetch on the plan root aborts the request.
    async fn resolve_fetch(
        &mut self,
        ctx: &Context,
        fetch: &Fetch,
        data: Option<&[u8]>,
        buffers: &mut HashMap<String, Vec<u8>>,
        root: bool,
    ) -> Result<(), ExecutionError> {
        match fetch {
            Fetch::Single(single) => {
                let args = resolve_arguments(&single.source.args, ctx, data);
                let mut buffer = Vec::new();
                match self
                    .data_sources
                    .resolve(&single.source.data_source, ctx, &args, &mut buffer)
                    .await
                {
                    Ok(instruction) => {
                        self.instructions.push(instruction);
                        buffers.insert(single.buffer_name.clone(), buffer);
                    }
                    Err(error) => {
                        if root {
                            return Err(ExecutionError::RootFetchFailure(error));
                        }
                        warn!(
                            buffer = %single.buffer_name,
                            error = %error,
                            "fetch failed, bound fields resolve to null"
                        );
                        self.errors.push(error.into());
                        buffers.insert(single.buffer_name.clone(), Vec::new());
                    }
                }
                Ok(())
            }
            Fetch::Parallel(parallel) => {
                let data_sources = self.data_sources.clone();
                let jobs = parallel.fetches.iter().map(|fetch: &SingleFetch| {
                    let args = resolve_arguments(&fetch.source.args, ctx, data);
                    let data_sources = data_sources.clone();
                    async move {
                        let mut buffer = Vec::new();
                        let result = data_sources
                            .resolve(&fetch.source.data_source, ctx, &args, &mut buffer)
                            .await;
                        (fetch, buffer, result)
                    }
                });
                let results = futures::future::join_all(jobs).await;
                for (fetch, buffer, result) in results {
                    match result {
                        Ok(instruction) => {
                            self.instructions.push(instruction);
                            buffers.insert(fetch.buffer_name.clone(), buffer);
                        }
                        Err(error) => {
                            warn!(
                                buffer = %fetch.buffer_name,
                                error = %error,
                                "parallel fetch failed, bound fields resolve to null"
                            );
                            self.errors.push(error.into());
                            buffers.insert(fetch.buffer_name.clone(), Vec::new());
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_value(value: &ValueNode, data: Option<&[u8]>, out: &mut Vec<u8>) {
        match data.and_then(|data| projection::select(data, &value.path)) {
            Some((raw, kind)) => projection::emit_scalar(out, &raw, kind, value.quote_value),
            None => out.extend_from_slice(b"null"),
        }
    }

    /// Elements resolve sequentially, on purpose: a list of resolver-backed
    /// objects fans out one upstream call per element, and serializing them
    /// bounds the pressure on that upstream.
    async fn resolve_list(
        &mut self,
        ctx: &Context,
        list: &ListNode,
        data: Option<&[u8]>,
        out: &mut Vec<u8>,
    ) -> Result<(), ExecutionError> {
        let elements = data.and_then(|data| projection::array_elements(data, &list.path));
        let Some(mut elements) = elements else {
            out.extend_from_slice(b"null");
            return Ok(());
        };
        if let Some(ListFilter::FirstN { n }) = &list.filter {
            elements.truncate(*n);
        }
        out.push(b'[');
        for (index, element) in elements.iter().enumerate() {
            if index > 0 {
                out.push(b',');
            }
            self.resolve_node(ctx, &list.value, Some(element), out)
                .await?;
        }
        out.push(b']');
        Ok(())
    }

    fn should_skip(skip: &SkipCondition, ctx: &Context, data: Option<&[u8]>) -> bool {
        match skip {
            SkipCondition::IfEqual { left, right } => {
                Self::operand(left, ctx, data) == Self::operand(right, ctx, data)
            }
            SkipCondition::IfNotEqual { left, right } => {
                Self::operand(left, ctx, data) != Self::operand(right, ctx, data)
            }
        }
    }

    fn operand(argument: &Argument, ctx: &Context, data: Option<&[u8]>) -> Bytes {
        match argument {
            Argument::Static(argument) => Bytes::copy_from_slice(argument.value.as_bytes()),
            Argument::Object(argument) => data
                .and_then(|data| projection::select(data, &argument.path))
                .map(|(raw, _)| raw)
                .unwrap_or_default(),
            Argument::Context(argument) => ctx
                .variable(&argument.variable_name)
                .cloned()
                .unwrap_or_default(),
            // Nested groups are not comparable operands.
            Argument::List(_) => Bytes::new(),
        }
    }
}
