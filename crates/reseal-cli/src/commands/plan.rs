//! Dry run: classification only.

use reseal_core::{CloudProvider, RunRequest};

use crate::client::{AppContext, CliResult};
use crate::commands::{abort_failure, export_metrics};
use crate::output::render_plan;

pub(crate) async fn handle_plan<P>(ctx: &AppContext<P>, request: &RunRequest) -> CliResult<()>
where
    P: CloudProvider,
{
    let plan = ctx.service.plan(request).await.map_err(abort_failure)?;
    export_metrics(ctx)?;
    render_plan(&plan, ctx.output)
}
