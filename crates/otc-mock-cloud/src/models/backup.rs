use crate::entity::{filter_matches, CloudEntity};
use crate::error::ApiError;
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDatabase {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Datastore {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Backup {
    pub id: String,
    pub instance_id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub backup_type: String,
    pub status: String,
    pub begin_time: String,
    pub size: i64,
    pub databases: Vec<BackupDatabase>,
    pub datastore: Datastore,
}

#[derive(Debug, Deserialize)]
pub struct BackupCreate {
    pub instance_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub databases: Option<Vec<BackupDatabase>>,
}

#[async_trait]
impl CloudEntity for Backup {
    const KIND: &'static str = "backup";

    type Create = BackupCreate;
    type Update = IgnoredAny;
    type Action = ();
    type Context = ();

    fn from_create_params(id: String, params: BackupCreate) -> Result<Self, ApiError> {
        if !(4..=64).contains(&params.name.len()) {
            return Err(ApiError::new(400, "DBS.200001", "backup name must be 4 to 64 characters"));
        }
        Ok(Self {
            id,
            instance_id: params.instance_id,
            name: params.name,
            description: params.description.unwrap_or_default(),
            backup_type: "manual".to_owned(),
            status: "BUILDING".to_owned(),
            begin_time: "2026-01-01T00:00:00+0000".to_owned(),
            size: 0,
            databases: params.databases.unwrap_or_default(),
            datastore: Datastore {
                kind: "PostgreSQL".to_owned(),
                version: "13".to_owned(),
            },
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_owned();
        if status == "COMPLETED" {
            self.size = 2048;
        }
    }

    fn settled_status(&self) -> String {
        "COMPLETED".to_owned()
    }

    fn matches(&self, filter: &[(String, String)]) -> bool {
        filter_matches(filter, |key| match key {
            "instance_id" => Some(self.instance_id.as_str()),
            "backup_id" => Some(self.id.as_str()),
            "name" => Some(self.name.as_str()),
            _ => None,
        })
    }

    async fn on_update(&mut self, _update: IgnoredAny, _ctx: &()) -> Result<(), ApiError> {
        Err(ApiError::bad_request("backups cannot be modified"))
    }
}
