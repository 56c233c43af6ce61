//! Analysis commands: statistics, grouped counts, footprints and the roofline heatmap

use super::{query_error, FilterArgs, Session};
use crate::output::format_value;
use anyhow::Result;
use clap::Args;
use jobarch_core::{Aggregate, Weight};
use jobarch_query::{Footprints, HeatmapGrid, HeatmapSpec};

/// Arguments of `count`
#[derive(Debug, Clone, Args)]
pub struct CountArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Grouping dimension (user, project, cluster)
    #[arg(long, default_value = "user")]
    pub by: Aggregate,

    /// Per-job weight (node-count, node-hours)
    #[arg(long)]
    pub weight: Option<Weight>,

    /// Keep only the top N groups
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Arguments of `heatmap`
#[derive(Debug, Clone, Args)]
pub struct HeatmapArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[arg(long, default_value = "10")]
    pub rows: usize,

    #[arg(long, default_value = "10")]
    pub cols: usize,

    /// Lower bound of operational intensity
    #[arg(long, default_value = "0.01", allow_negative_numbers = true)]
    pub min_x: f64,

    /// Upper bound of operational intensity
    #[arg(long, default_value = "1000", allow_negative_numbers = true)]
    pub max_x: f64,

    /// Lower bound of the flop rate
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    pub min_y: f64,

    /// Upper bound of the flop rate
    #[arg(long, default_value = "100000", allow_negative_numbers = true)]
    pub max_y: f64,
}

impl HeatmapArgs {
    fn spec(&self) -> HeatmapSpec {
        HeatmapSpec::new(self.rows, self.cols, self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Aggregate statistics, optionally per group
pub async fn show_stats(
    session: &Session,
    filter: FilterArgs,
    group_by: Option<Aggregate>,
) -> Result<()> {
    let filters = filter.to_filters()?;
    let stats = session
        .engine
        .jobs_statistics(&session.ctx, &filters, group_by)
        .await
        .map_err(query_error)?;

    match (group_by, stats.as_slice()) {
        (None, [single]) => session.formatter.print_item(single),
        _ => session.formatter.print_list(&stats),
    }
}

/// Job counts per group
pub async fn count_jobs(session: &Session, args: CountArgs) -> Result<()> {
    let filters = args.filter.to_filters()?;
    let counts = session
        .engine
        .jobs_count(&session.ctx, &filters, args.by, args.weight, args.limit)
        .await
        .map_err(query_error)?;
    session.formatter.print_list(&counts)
}

/// Per-job metric footprints with node-hours
pub async fn show_footprints(
    session: &Session,
    filter: FilterArgs,
    metrics: Vec<String>,
) -> Result<()> {
    let filters = filter.to_filters()?;
    let footprints = session
        .engine
        .jobs_footprints(&session.ctx, &filters, &metrics)
        .await
        .map_err(query_error)?;

    if session.formatter.is_structured() {
        return session.formatter.print_value(&footprints);
    }
    let (headers, rows) = footprint_table(&footprints);
    session.formatter.print_table(&headers, &rows);
    session
        .formatter
        .print_info(&format!("{} jobs", footprints.len()));
    Ok(())
}

/// Roofline heatmap of the filtered jobs
pub async fn show_heatmap(session: &Session, args: HeatmapArgs) -> Result<()> {
    let filters = args.filter.to_filters()?;
    let grid = session
        .engine
        .roofline_heatmap(&session.ctx, &filters, args.spec())
        .await
        .map_err(query_error)?;

    if session.formatter.is_structured() {
        return session.formatter.print_value(&grid);
    }
    let (headers, rows) = heatmap_table(&grid);
    session.formatter.print_table(&headers, &rows);
    session
        .formatter
        .print_info(&format!("{} jobs binned", grid.total()));
    Ok(())
}

fn footprint_table(footprints: &Footprints) -> (Vec<String>, Vec<Vec<String>>) {
    let mut headers = vec!["#".to_string(), "Node hours".to_string()];
    headers.extend(footprints.metrics.iter().map(|m| m.metric.clone()));

    let rows = (0..footprints.len())
        .map(|i| {
            let mut row = vec![i.to_string(), format!("{:.2}", footprints.nodehours[i])];
            row.extend(footprints.metrics.iter().map(|m| format_value(m.data[i])));
            row
        })
        .collect();
    (headers, rows)
}

/// Highest flop-rate row first
fn heatmap_table(grid: &HeatmapGrid) -> (Vec<String>, Vec<Vec<String>>) {
    let mut headers = vec!["Row".to_string()];
    headers.extend((0..grid.spec.cols).map(|c| c.to_string()));

    let rows = grid
        .tiles
        .iter()
        .enumerate()
        .rev()
        .map(|(r, tiles)| {
            let mut row = vec![r.to_string()];
            row.extend(tiles.iter().map(|w| {
                if *w == 0.0 {
                    ".".to_string()
                } else {
                    w.to_string()
                }
            }));
            row
        })
        .collect();
    (headers, rows)
}
