//! The subscription driver: re-executes a plan until the upstream or the
//! client calls it off, emitting one complete JSON document per frame.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{instrument, trace};

use crate::{
    context::Context,
    datasources::Instruction,
    error::ExecutionError,
    executor::Executor,
    plan::{ObjectNode, OperationType},
};

/// Drives `plan` against `executor`, sending each emission to `sink`.
///
/// Non-subscription plans execute exactly once. Subscription plans loop
/// until the context is cancelled or a fetch returns `CloseConnection`;
/// frames byte-identical to the previous emission are suppressed. The
/// previous frame's buffer is recycled between iterations, so steady-state
/// streaming does not allocate per frame.
#[instrument(level = "debug", skip_all)]
pub async fn execute_stream(
    executor: &mut Executor,
    ctx: &Context,
    plan: &ObjectNode,
    sink: &mpsc::Sender<Bytes>,
) -> Result<(), ExecutionError> {
    let mut current = Vec::with_capacity(4096);
    let mut previous: Vec<u8> = Vec::new();
    loop {
        current.clear();
        let instructions = executor.execute(ctx, plan, &mut current).await?;
        if instructions.contains(&Instruction::CloseConnection) {
            return Ok(());
        }
        if plan.operation_type != OperationType::Subscription {
            let _ = sink.send(Bytes::copy_from_slice(&current)).await;
            return Ok(());
        }
        if current == previous {
            trace!("suppressing frame identical to the previous emission");
            continue;
        }
        if sink.send(Bytes::copy_from_slice(&current)).await.is_err() {
            // Receiver went away; nobody is listening anymore.
            return Ok(());
        }
        if !instructions.contains(&Instruction::Continue) {
            // Every fetch asked to close unless stream-backed; without a
            // streaming source there is no next frame to wait for.
            return Ok(());
        }
        std::mem::swap(&mut previous, &mut current);
    }
}
