//! Cluster metadata and node-list expressions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-cluster metric definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    pub name: String,

    #[serde(default)]
    pub unit: String,

    /// Native scope of the metric (node, socket, core, hwthread, accelerator)
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Sampling interval in seconds
    #[serde(default)]
    pub timestep: u32,

    #[serde(default)]
    pub peak: f64,
    #[serde(default)]
    pub normal: f64,
    #[serde(default)]
    pub caution: f64,
    #[serde(default)]
    pub alert: f64,
}

fn default_scope() -> String {
    "node".to_string()
}

impl MetricConfig {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            scope: default_scope(),
            timestep: 60,
            peak: 0.0,
            normal: 0.0,
            caution: 0.0,
            alert: 0.0,
        }
    }
}

/// Homogeneous partition of a cluster's hardware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCluster {
    pub name: String,

    /// Node-list expression, e.g. `f[0101-0188],g01`
    pub nodes: String,

    #[serde(default)]
    pub processor_type: String,

    #[serde(default)]
    pub sockets_per_node: u32,
    #[serde(default)]
    pub cores_per_socket: u32,
    #[serde(default)]
    pub threads_per_core: u32,

    /// Peak flop rate per node, GF/s
    #[serde(default)]
    pub flop_rate_peak: f64,

    /// Peak memory bandwidth per node, GB/s
    #[serde(default)]
    pub memory_bandwidth_peak: f64,
}

impl SubCluster {
    pub fn new(name: impl Into<String>, nodes: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: nodes.into(),
            processor_type: String::new(),
            sockets_per_node: 0,
            cores_per_socket: 0,
            threads_per_core: 0,
            flop_rate_peak: 0.0,
            memory_bandwidth_peak: 0.0,
        }
    }

    pub fn node_list(&self) -> Result<NodeList> {
        self.nodes.parse()
    }
}

/// A cluster known to the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,

    #[serde(default)]
    pub metric_config: Vec<MetricConfig>,

    #[serde(default)]
    pub sub_clusters: Vec<SubCluster>,
}

impl Cluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_config: Vec::new(),
            sub_clusters: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: MetricConfig) -> Self {
        self.metric_config.push(metric);
        self
    }

    pub fn with_sub_cluster(mut self, sub_cluster: SubCluster) -> Self {
        self.sub_clusters.push(sub_cluster);
        self
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metric_config.iter().map(|m| m.name.clone()).collect()
    }

    pub fn sub_cluster(&self, name: &str) -> Option<&SubCluster> {
        self.sub_clusters.iter().find(|sc| sc.name == name)
    }

    /// Subcluster whose node list contains `hostname`
    pub fn sub_cluster_of_host(&self, hostname: &str) -> Option<&SubCluster> {
        self.sub_clusters.iter().find(|sc| {
            sc.node_list()
                .map(|list| list.contains(hostname))
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumberRange {
    start: u64,
    end: u64,
    /// Zero-padded digit count
    width: usize,
}

/// Upper bound on the hosts a single node-list expression may name
const MAX_NODE_LIST_HOSTS: usize = 1 << 20;

impl NumberRange {
    /// Bounds are ordered and capped by `parse_range`
    fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeTerm {
    prefix: String,
    /// Empty for a plain hostname
    ranges: Vec<NumberRange>,
}

impl NodeTerm {
    fn parse(term: &str) -> Result<Self> {
        let Some(open) = term.find('[') else {
            if term.contains(']') {
                return Err(Error::parse(format!("unbalanced ']' in node list term '{}'", term)));
            }
            return Ok(Self {
                prefix: term.to_string(),
                ranges: Vec::new(),
            });
        };

        if !term.ends_with(']') {
            return Err(Error::parse(format!(
                "node list term '{}' must end with ']'",
                term
            )));
        }

        let prefix = &term[..open];
        let body = &term[open + 1..term.len() - 1];
        if body.contains('[') || body.contains(']') {
            return Err(Error::parse(format!("nested brackets in '{}'", term)));
        }

        let ranges = body
            .split(',')
            .map(|part| parse_range(part.trim()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefix: prefix.to_string(),
            ranges,
        })
    }

    fn len(&self) -> usize {
        if self.ranges.is_empty() {
            1
        } else {
            self.ranges.iter().map(NumberRange::len).sum()
        }
    }

    fn contains(&self, hostname: &str) -> bool {
        if self.ranges.is_empty() {
            return self.prefix == hostname;
        }

        let Some(digits) = hostname.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let Ok(number) = digits.parse::<u64>() else {
            return false;
        };

        self.ranges.iter().any(|range| {
            digits.len() == range.width && range.start <= number && number <= range.end
        })
    }

    fn expand_into(&self, hosts: &mut Vec<String>) {
        if self.ranges.is_empty() {
            hosts.push(self.prefix.clone());
            return;
        }
        for range in &self.ranges {
            for n in range.start..=range.end {
                hosts.push(format!("{}{:0width$}", self.prefix, n, width = range.width));
            }
        }
    }
}

fn parse_range(part: &str) -> Result<NumberRange> {
    let (start, end) = match part.split_once('-') {
        Some((start, end)) => (start, end),
        None => (part, part),
    };

    if start.is_empty() || end.is_empty() {
        return Err(Error::parse(format!("empty bound in node range '{}'", part)));
    }
    if start.len() != end.len() {
        return Err(Error::parse(format!(
            "node range '{}' has bounds of different width",
            part
        )));
    }

    let parse = |s: &str| {
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::parse(format!("'{}' is not a node number", s)));
        }
        s.parse::<u64>()
            .map_err(|e| Error::parse(format!("invalid node number '{}': {}", s, e)))
    };
    let (lo, hi) = (parse(start)?, parse(end)?);
    if lo > hi {
        return Err(Error::parse(format!("inverted node range '{}'", part)));
    }
    let span = usize::try_from(hi - lo).ok().and_then(|n| n.checked_add(1));
    if !span.is_some_and(|n| n <= MAX_NODE_LIST_HOSTS) {
        return Err(Error::parse(format!(
            "node range '{}' names more than {} hosts",
            part, MAX_NODE_LIST_HOSTS
        )));
    }

    Ok(NumberRange {
        start: lo,
        end: hi,
        width: start.len(),
    })
}

/// Parsed node-list expression such as `f[0101-0188],g01,h[01,05-07]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeList {
    source: String,
    terms: Vec<NodeTerm>,
}

impl NodeList {
    /// Number of hosts named by the expression
    pub fn len(&self) -> usize {
        self.terms.iter().map(NodeTerm::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.terms.iter().any(|term| term.contains(hostname))
    }

    /// Every hostname, in expression order
    pub fn expand(&self) -> Vec<String> {
        let mut hosts = Vec::with_capacity(self.len());
        for term in &self.terms {
            term.expand_into(&mut hosts);
        }
        hosts
    }
}

impl FromStr for NodeList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut terms = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;

        // Commas inside brackets separate ranges, not terms
        for (i, c) in s.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| Error::parse(format!("unbalanced ']' in '{}'", s)))?;
                }
                ',' if depth == 0 => {
                    push_term(&mut terms, &s[start..i])?;
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(Error::parse(format!("unclosed '[' in '{}'", s)));
        }
        push_term(&mut terms, &s[start..])?;

        let hosts = terms
            .iter()
            .try_fold(0usize, |total, term| total.checked_add(term.len()));
        if !hosts.is_some_and(|n| n <= MAX_NODE_LIST_HOSTS) {
            return Err(Error::parse(format!(
                "node list '{}' names more than {} hosts",
                s, MAX_NODE_LIST_HOSTS
            )));
        }

        Ok(Self {
            source: s.to_string(),
            terms,
        })
    }
}

fn push_term(terms: &mut Vec<NodeTerm>, raw: &str) -> Result<()> {
    let raw = raw.trim();
    if !raw.is_empty() {
        terms.push(NodeTerm::parse(raw)?);
    }
    Ok(())
}

impl fmt::Display for NodeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
