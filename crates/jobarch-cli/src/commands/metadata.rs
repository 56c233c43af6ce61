//! Archive metadata commands

use super::{query_error, Session};
use anyhow::Result;
use serde_json::json;

/// Hosts in use by running jobs of a cluster, per subcluster
pub async fn allocated_nodes(session: &Session, cluster: String) -> Result<()> {
    let counts = session
        .engine
        .allocated_nodes(&session.ctx, &cluster)
        .await
        .map_err(query_error)?;
    session.formatter.print_list(&counts)
}

pub async fn list_clusters(session: &Session) -> Result<()> {
    let clusters = session
        .engine
        .clusters(&session.ctx)
        .await
        .map_err(query_error)?;
    session.formatter.print_list(&clusters)
}

pub async fn list_tags(session: &Session) -> Result<()> {
    let tags = session.engine.tags(&session.ctx).await.map_err(query_error)?;
    session.formatter.print_list(&tags)
}

pub async fn list_partitions(session: &Session, cluster: String) -> Result<()> {
    let partitions = session
        .engine
        .partitions(&session.ctx, &cluster)
        .await
        .map_err(query_error)?;

    if session.formatter.is_structured() {
        return session.formatter.print_value(&partitions);
    }
    let rows: Vec<Vec<String>> = partitions.into_iter().map(|p| vec![p]).collect();
    session
        .formatter
        .print_table(&["Partition".to_string()], &rows);
    Ok(())
}

/// Host count of a subcluster
pub async fn number_of_nodes(
    session: &Session,
    cluster: String,
    sub_cluster: String,
) -> Result<()> {
    let nodes = session
        .engine
        .number_of_nodes(&session.ctx, &cluster, &sub_cluster)
        .await
        .map_err(query_error)?;

    if session.formatter.is_structured() {
        return session.formatter.print_value(&json!({
            "cluster": cluster,
            "subCluster": sub_cluster,
            "nodes": nodes,
        }));
    }
    println!("{}/{}: {} nodes", cluster, sub_cluster, nodes);
    Ok(())
}
