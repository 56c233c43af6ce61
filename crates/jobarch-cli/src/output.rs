//! Output formatting for the jobarch CLI

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use jobarch_core::{Cluster, Count, JobRecord, JobState, Tag};
use jobarch_query::{JobMetricValue, JobsStatistics};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Compact text format
    Text,
}

/// Trait for types that can be formatted for output
pub trait Formattable {
    /// Format as a table row
    fn table_headers() -> Vec<String>;
    fn table_row(&self) -> Vec<String>;

    /// Format as key-value pairs for detailed view
    fn key_value_pairs(&self) -> Vec<(String, String)>;
}

/// Output formatter
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Whether output is machine-readable
    pub fn is_structured(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::Yaml)
    }

    /// Print any serializable value in a structured format
    pub fn print_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        match self.format {
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
            _ => println!("{}", serde_json::to_string_pretty(value)?),
        }
        Ok(())
    }

    /// Format and print a single item
    pub fn print_item<T>(&self, item: &T) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        if self.is_structured() {
            return self.print_value(item);
        }
        for (key, value) in item.key_value_pairs() {
            match self.format {
                OutputFormat::Table => println!("{}: {}", key.bold().cyan(), value),
                _ => println!("{}: {}", key, value),
            }
        }
        Ok(())
    }

    /// Format and print a list of items
    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        if self.is_structured() {
            return self.print_value(items);
        }
        if items.is_empty() {
            println!("{}", "No items found".dimmed());
            return Ok(());
        }

        match self.format {
            OutputFormat::Table => {
                let rows: Vec<Vec<String>> = items.iter().map(Formattable::table_row).collect();
                self.print_table(&T::table_headers(), &rows);
            }
            _ => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    for (key, value) in item.key_value_pairs() {
                        println!("{}: {}", key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Print rows under headers; tab-separated in text format
    pub fn print_table(&self, headers: &[String], rows: &[Vec<String>]) {
        if self.format == OutputFormat::Text {
            println!("{}", headers.join("\t"));
            for row in rows {
                println!("{}", row.join("\t"));
            }
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        let header_cells: Vec<Cell> = headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
            .collect();
        table.set_header(header_cells);

        for row in rows {
            table.add_row(row);
        }

        println!("{}", table);
    }

    /// Print an info message; suppressed for structured formats
    pub fn print_info(&self, message: &str) {
        if !self.is_structured() {
            println!("{} {}", "ℹ".blue().bold(), message.blue());
        }
    }

    /// Print a success message
    pub fn print_success(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json | OutputFormat::Yaml => {
                self.print_value(&serde_json::json!({
                    "status": "success",
                    "message": message
                }))?;
            }
            OutputFormat::Table | OutputFormat::Text => {
                println!("{} {}", "✓".green().bold(), message.green());
            }
        }
        Ok(())
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) {
        if !self.is_structured() {
            eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
        }
    }
}

/// Helper function to format duration
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

/// Format an optional metric value
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

fn format_with_unit(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2} {}", v, unit),
        None => "-".to_string(),
    }
}

/// Helper function to colorize a job state
pub fn colorize_state(state: JobState) -> ColoredString {
    let name = state.as_str();
    match state {
        JobState::Running => name.green(),
        JobState::Completed => name.normal(),
        JobState::Failed | JobState::OutOfMemory => name.red(),
        JobState::Timeout | JobState::Preempted => name.yellow(),
        JobState::Cancelled | JobState::Stopped => name.dimmed(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Formattable for JobRecord {
    fn table_headers() -> Vec<String> {
        strings(&[
            "ID", "Job ID", "User", "Project", "Cluster", "Partition", "Start", "Duration",
            "Nodes", "State",
        ])
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.job_id.clone(),
            self.user.clone(),
            self.project.clone(),
            self.cluster.clone(),
            self.partition.clone(),
            self.start_time.format("%Y-%m-%d %H:%M").to_string(),
            format_duration(self.duration),
            self.num_nodes.to_string(),
            colorize_state(self.state).to_string(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let hosts: Vec<&str> = self.resources.iter().map(|r| r.hostname.as_str()).collect();
        let tags: Vec<&str> = self.tags.iter().map(|t| t.name.as_str()).collect();
        vec![
            ("ID".to_string(), self.id.to_string()),
            ("Job ID".to_string(), self.job_id.clone()),
            ("User".to_string(), self.user.clone()),
            ("Project".to_string(), self.project.clone()),
            ("Cluster".to_string(), format!("{}/{}", self.cluster, self.sub_cluster)),
            ("Partition".to_string(), self.partition.clone()),
            ("Start".to_string(), self.start_time.to_rfc3339()),
            ("Duration".to_string(), format_duration(self.duration)),
            ("State".to_string(), colorize_state(self.state).to_string()),
            ("Nodes".to_string(), self.num_nodes.to_string()),
            ("HW Threads".to_string(), self.num_hwthreads.to_string()),
            ("Accelerators".to_string(), self.num_accelerators.to_string()),
            ("Hosts".to_string(), hosts.join(",")),
            ("Tags".to_string(), tags.join(",")),
            ("Flops (avg)".to_string(), format_with_unit(self.flops_any_avg, "GF/s")),
            ("Mem BW (avg)".to_string(), format_with_unit(self.mem_bw_avg, "GB/s")),
            ("Load (avg)".to_string(), format_value(self.load_avg)),
            ("Mem used (max)".to_string(), format_with_unit(self.mem_used_max, "GB")),
        ]
    }
}

impl Formattable for Count {
    fn table_headers() -> Vec<String> {
        strings(&["Name", "Count"])
    }

    fn table_row(&self) -> Vec<String> {
        vec![self.name.clone(), self.count.to_string()]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![(self.name.clone(), self.count.to_string())]
    }
}

impl Formattable for JobsStatistics {
    fn table_headers() -> Vec<String> {
        strings(&["Group", "Jobs", "Short jobs", "Walltime (h)", "Node hours"])
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.total_jobs.to_string(),
            self.short_jobs.to_string(),
            self.total_walltime.to_string(),
            self.total_core_hours.to_string(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let histogram = |points: &[jobarch_core::HistoPoint]| {
            points
                .iter()
                .map(|p| format!("{}:{}", p.value, p.count))
                .collect::<Vec<_>>()
                .join(" ")
        };
        vec![
            ("Group".to_string(), self.id.clone()),
            ("Jobs".to_string(), self.total_jobs.to_string()),
            ("Short jobs".to_string(), self.short_jobs.to_string()),
            ("Walltime (h)".to_string(), self.total_walltime.to_string()),
            ("Node hours".to_string(), self.total_core_hours.to_string()),
            ("Walltime histogram".to_string(), histogram(&self.hist_walltime)),
            ("Node histogram".to_string(), histogram(&self.hist_num_nodes)),
        ]
    }
}

impl Formattable for JobMetricValue {
    fn table_headers() -> Vec<String> {
        strings(&["Metric", "Value"])
    }

    fn table_row(&self) -> Vec<String> {
        vec![self.name.clone(), format_value(self.value)]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![(self.name.clone(), format_value(self.value))]
    }
}

impl Formattable for Cluster {
    fn table_headers() -> Vec<String> {
        strings(&["Cluster", "Subclusters", "Metrics"])
    }

    fn table_row(&self) -> Vec<String> {
        let sub_clusters: Vec<&str> = self.sub_clusters.iter().map(|sc| sc.name.as_str()).collect();
        vec![
            self.name.clone(),
            sub_clusters.join(","),
            self.metric_names().join(","),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("Cluster".to_string(), self.name.clone())];
        for sc in &self.sub_clusters {
            pairs.push((format!("Subcluster {}", sc.name), sc.nodes.clone()));
        }
        pairs.push(("Metrics".to_string(), self.metric_names().join(",")));
        pairs
    }
}

impl Formattable for Tag {
    fn table_headers() -> Vec<String> {
        strings(&["ID", "Type", "Name"])
    }

    fn table_row(&self) -> Vec<String> {
        vec![self.id.to_string(), self.tag_type.clone(), self.name.clone()]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("ID".to_string(), self.id.to_string()),
            ("Type".to_string(), self.tag_type.clone()),
            ("Name".to_string(), self.name.clone()),
        ]
    }
}
