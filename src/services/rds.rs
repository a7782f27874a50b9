//! RDS v3 backups. The API has no get-by-id; lookups filter the list.

use super::with_query;
use otc_framework::{CloudError, ServiceClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDatabase {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Datastore {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Backup {
    pub id: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub backup_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub begin_time: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub databases: Vec<BackupDatabase>,
    #[serde(default)]
    pub datastore: Datastore,
}

#[derive(Debug, Serialize)]
pub struct BackupCreate {
    pub instance_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<BackupDatabase>>,
}

#[derive(Debug, Deserialize)]
struct BackupList {
    #[serde(default)]
    backups: Vec<Backup>,
}

#[instrument(skip(client, opts), fields(instance_id = %opts.instance_id, name = %opts.name))]
pub async fn create_backup(client: &ServiceClient, opts: &BackupCreate) -> Result<Backup, CloudError> {
    debug!(?opts, "Creating backup");
    let url = client.url(&["backups"]);
    let response: serde_json::Value = client.post(&url, opts).await?;
    super::unwrap(&url, response, "backup")
}

#[instrument(skip(client))]
pub async fn list_backups(client: &ServiceClient, instance_id: &str, backup_id: &str) -> Result<Vec<Backup>, CloudError> {
    let url = with_query(
        client.url(&["backups"]),
        &[("instance_id", instance_id), ("backup_id", backup_id)],
    );
    let list: BackupList = client.get(&url).await?;
    Ok(list.backups)
}

/// An empty filtered list is reported as not found.
#[instrument(skip(client))]
pub async fn get_backup(client: &ServiceClient, instance_id: &str, backup_id: &str) -> Result<Backup, CloudError> {
    let backups = list_backups(client, instance_id, backup_id).await?;
    backups
        .into_iter()
        .find(|b| b.id == backup_id)
        .ok_or_else(|| CloudError::NotFound {
            url: client.url(&["backups", backup_id]),
        })
}

#[instrument(skip(client))]
pub async fn delete_backup(client: &ServiceClient, id: &str) -> Result<(), CloudError> {
    client.delete(&client.url(&["backups", id])).await
}
