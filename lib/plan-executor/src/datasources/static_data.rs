use async_trait::async_trait;
use tracing::warn;

use crate::{
    arguments::ResolvedArgs,
    context::Context,
    datasources::{DataSource, Instruction},
    error::DataSourceError,
};

/// Emits the bytes of its single value argument verbatim. Used for plan
/// literals inlined by the planner and as a deterministic source in tests.
pub struct StaticDataSource;

#[async_trait]
impl DataSource for StaticDataSource {
    async fn resolve(
        &self,
        _ctx: &Context,
        args: &ResolvedArgs,
        out: &mut Vec<u8>,
    ) -> Result<Instruction, DataSourceError> {
        match args.first() {
            Some(pair) => out.extend_from_slice(&pair.value),
            None => warn!("static data source invoked without a value argument"),
        }
        Ok(Instruction::CloseConnectionIfNotStream)
    }
}
