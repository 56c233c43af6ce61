//! Job listing and lookup commands

use super::{query_error, FilterArgs, Session};
use anyhow::Result;
use clap::Args;
use jobarch_core::{OrderBy, PageRequest};

/// Arguments of `jobs`
#[derive(Debug, Clone, Args)]
pub struct ListJobsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Page number (1-based)
    #[arg(long, default_value = "1")]
    pub page: i64,

    /// Items per page (defaults to output.items_per_page)
    #[arg(long)]
    pub items: Option<i64>,

    /// Sort field, e.g. startTime, duration, numNodes
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub desc: bool,
}

impl ListJobsArgs {
    fn order(&self) -> Option<OrderBy> {
        self.sort.as_ref().map(|field| {
            OrderBy::new(field.clone(), if self.desc { "DESC" } else { "ASC" })
        })
    }
}

/// List one page of matching jobs
pub async fn list_jobs(session: &Session, args: ListJobsArgs, items_per_page: i64) -> Result<()> {
    let filters = args.filter.to_filters()?;
    let page = PageRequest::new(args.items.unwrap_or(items_per_page), args.page);
    let order = args.order();

    let result = session
        .engine
        .jobs(&session.ctx, &filters, Some(&page), order.as_ref())
        .await
        .map_err(query_error)?;

    if session.formatter.is_structured() {
        return session.formatter.print_value(&result);
    }

    session.formatter.print_list(&result.items)?;
    let first = if result.items.is_empty() { 0 } else { result.offset + 1 };
    session.formatter.print_info(&format!(
        "Showing {}-{} of {} jobs",
        first,
        result.offset + result.items.len(),
        result.count
    ));
    Ok(())
}

/// Show a single job
pub async fn describe_job(session: &Session, id: i64) -> Result<()> {
    let job = session
        .engine
        .job(&session.ctx, id)
        .await
        .map_err(query_error)?;
    session.formatter.print_item(&job)
}

/// Show metric scalars of a single job
pub async fn job_metrics(session: &Session, id: i64, metrics: Vec<String>) -> Result<()> {
    let values = session
        .engine
        .job_metrics(&session.ctx, id, &metrics)
        .await
        .map_err(query_error)?;

    let missing = values.iter().filter(|v| v.value.is_none()).count();
    session.formatter.print_list(&values)?;
    if missing > 0 {
        session
            .formatter
            .print_warning(&format!("{} metric(s) have no recorded value", missing));
    }
    Ok(())
}
