//! `opentelekomcloud_rds_backup_v3`
//!
//! Manual backups of an RDS instance. Backups are immutable, so every argument is force-new.
//! The API has no lookup by ID; reads filter the instance's backup list. Imports take
//! `<instance_id>/<backup_id>`.

use super::{opt_string, service_client, wait_status};
use crate::services::rds::{self, Backup, BackupCreate, BackupDatabase};
use async_trait::async_trait;
use otc_framework::import::parse_composite_id;
use otc_framework::mapper::flatten_singleton;
use otc_framework::prelude::*;
use otc_framework::Verb;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "opentelekomcloud_rds_backup_v3";

fn flatten_databases(backup: &Backup) -> Value {
    Value::List(
        backup
            .databases
            .iter()
            .map(|db| Value::Map(BTreeMap::from([("name".to_owned(), Value::from(db.name.clone()))])))
            .collect(),
    )
}

pub struct RdsBackupResource;

#[async_trait]
impl Resource for RdsBackupResource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(
            Block::new()
                .attr("instance_id", Attribute::required(Kind::String).force_new())
                .attr(
                    "name",
                    Attribute::required(Kind::String)
                        .force_new()
                        .validate(validation::string_len_between(4, 64)),
                )
                .attr(
                    "description",
                    Attribute::optional(Kind::String)
                        .force_new()
                        .validate(validation::string_len_between(0, 256)),
                )
                .attr(
                    "databases",
                    Attribute::optional(Kind::block_list(
                        Block::new().attr("name", Attribute::required(Kind::String)),
                    ))
                    .force_new(),
                )
                .attr("type", Attribute::computed(Kind::String))
                .attr("status", Attribute::computed(Kind::String))
                .attr("begin_time", Attribute::computed(Kind::String))
                .attr("size", Attribute::computed(Kind::Int))
                .attr(
                    "datastore",
                    Attribute::computed(Kind::block_list(
                        Block::new()
                            .attr("type", Attribute::computed(Kind::String))
                            .attr("version", Attribute::computed(Kind::String)),
                    )),
                )
                .attr("region", Attribute::region()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
            .with_create(Duration::from_secs(30 * 60))
            .with_delete(Duration::from_secs(10 * 60))
    }

    async fn create(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::RdsV3).await?;
        let databases: Vec<BackupDatabase> = d
            .get("databases")
            .as_slice()
            .unwrap_or_default()
            .iter()
            .filter_map(|db| db.get_path("name").and_then(Value::as_str))
            .map(|name| BackupDatabase { name: name.to_owned() })
            .collect();
        let opts = BackupCreate {
            instance_id: d.get_string("instance_id"),
            name: d.get_string("name"),
            description: opt_string(d, "description"),
            databases: (!databases.is_empty()).then_some(databases),
        };
        let created = rds::create_backup(&client, &opts).await?;
        d.set_id(created.id.clone());
        info!(id = %created.id, instance_id = %opts.instance_id, "Backup started");

        let (client, instance_id, id) = (&client, opts.instance_id.as_str(), created.id.as_str());
        let conf = StateChangeConf::new(&["BUILDING"], &["COMPLETED"]);
        wait_status(ctx, conf, d.timeout(Verb::Create), move || {
            rds::get_backup(client, instance_id, id)
        })
        .await?;
        Ok(())
    }

    async fn read(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::RdsV3).await?;
        let instance_id = d.get_string("instance_id");
        let backup = rds::get_backup(&client, &instance_id, d.id()).await?;
        let region = ctx.region(d);

        d.set("databases", flatten_databases(&backup))?;
        d.set(
            "datastore",
            flatten_singleton(BTreeMap::from([
                ("type".to_owned(), Value::from(backup.datastore.kind)),
                ("version".to_owned(), Value::from(backup.datastore.version)),
            ])),
        )?;
        d.set("size", backup.size)?;
        d.set_many([
            ("instance_id", backup.instance_id),
            ("name", backup.name),
            ("description", backup.description),
            ("type", backup.backup_type),
            ("status", backup.status),
            ("begin_time", backup.begin_time),
            ("region", region),
        ])?;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
        let client = service_client(ctx, d, ServiceVersion::RdsV3).await?;
        let (instance_id, id) = (d.get_string("instance_id"), d.id().to_owned());
        rds::delete_backup(&client, &id).await?;

        let (client, instance_id, id) = (&client, instance_id.as_str(), id.as_str());
        let conf = StateChangeConf::delete().with_pending(&["COMPLETED", "DELETING"]);
        wait_status(ctx, conf, d.timeout(Verb::Delete), move || {
            rds::get_backup(client, instance_id, id)
        })
        .await?;
        Ok(())
    }

    async fn import(&self, _ctx: &RequestContext, d: &mut ResourceData, id: &str) -> Result<(), ProviderError> {
        let (instance_id, backup_id) = parse_composite_id(id)?;
        d.set("instance_id", instance_id)?;
        d.set_id(backup_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otc_framework::mock::MockTransport;
    use otc_framework::{ClientFactory, ProviderConfig, ProviderMeta};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn context() -> RequestContext {
        let config = ProviderConfig {
            auth_url: Some("https://iam.eu-de.otc.t-systems.com/v3".into()),
            region: Some("eu-de".into()),
            project_id: Some("p1".into()),
            access_key: Some("AK".into()),
            secret_key: Some("SK".into()),
            ..Default::default()
        };
        let meta = ProviderMeta::new(ClientFactory::new(config, MockTransport::new().transport()));
        RequestContext::new(Arc::new(meta), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_import_seeds_instance_and_backup() {
        let resource = RdsBackupResource;
        let mut d = ResourceData::for_import(Arc::new(resource.schema()), "");

        resource.import(&context(), &mut d, "inst-123/bak-456").await.unwrap();

        assert_eq!(d.id(), "bak-456");
        assert_eq!(d.get_string("instance_id"), "inst-123");
    }

    #[tokio::test]
    async fn test_import_rejects_plain_ids() {
        let resource = RdsBackupResource;
        let mut d = ResourceData::for_import(Arc::new(resource.schema()), "");

        for id in ["bak-456", "inst-123/", "a/b/c"] {
            let err = resource.import(&context(), &mut d, id).await.unwrap_err();
            assert!(matches!(err, ProviderError::Import { .. }), "{id}: {err}");
        }
        assert!(d.id().is_empty());
    }
}
