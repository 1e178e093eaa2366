//! Tenant preparation: turns a configured tenant into a `Prepared` tenant
//! with a live connection, accessible-schema set, and metadata, or drops
//! it (spec.md §4.D).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::TenantConfig;
use crate::driver::{HdbTenantConnection, TenantConnection};
use crate::secrets::SecretStore;

/// Mirrors the documented state machine. Only `Prepared` tenants are ever
/// constructed by [`prepare_tenants`] — `Configured`/`Connecting`/
/// `Connected` are transient states a tenant passes through during
/// preparation and are not retained afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantState {
    Prepared,
    Closed,
}

/// A tenant that has successfully completed preparation: it owns a live
/// connection and carries the metadata later needed for the shared label
/// set on every sample it produces.
pub struct Tenant {
    pub name: String,
    pub tags: Vec<String>,
    pub usage: String,
    pub schemas: Vec<String>,
    pub sid: String,
    pub instance_number: String,
    pub database_name: String,
    pub version: String,
    pub state: TenantState,
    conn: Arc<dyn TenantConnection>,
}

impl Tenant {
    pub fn connection(&self) -> Arc<dyn TenantConnection> {
        Arc::clone(&self.conn)
    }

    pub async fn close(&mut self) {
        if let Err(err) = self.conn.close().await {
            error!(tenant = %self.name, %err, "error closing tenant connection");
        }
        self.state = TenantState::Closed;
    }
}

const METADATA_QUERY: &str = "SELECT
(SELECT value FROM M_SYSTEM_OVERVIEW WHERE section = 'System' AND name = 'Instance ID') SID,
(SELECT value FROM M_SYSTEM_OVERVIEW WHERE section = 'System' AND name = 'Instance Number') INSNR,
m.database_name,
m.version
FROM m_database m";

/// Prepares every configured tenant in sequence. Tenants that fail any
/// step are dropped and logged; the returned list contains only tenants
/// in the `Prepared` state. A zero-length result is valid — the caller
/// still starts the HTTP listener (spec.md §7).
pub async fn prepare_tenants(
    configs: &[TenantConfig],
    secrets: &dyn SecretStore,
    connect_timeout: Duration,
) -> Vec<Tenant> {
    let mut prepared = Vec::new();
    for cfg in configs {
        match prepare_one(cfg, secrets, connect_timeout).await {
            Ok(tenant) => {
                info!(
                    tenant = %tenant.name,
                    usage = %tenant.usage,
                    schemas = tenant.schemas.len(),
                    "tenant prepared"
                );
                prepared.push(tenant);
            }
            Err(reason) => {
                error!(tenant = %cfg.name, %reason, "tenant preparation failed, dropping");
            }
        }
    }
    prepared
}

async fn prepare_one(
    cfg: &TenantConfig,
    secrets: &dyn SecretStore,
    timeout: Duration,
) -> Result<Tenant, String> {
    let password = secrets
        .password_for(&cfg.name)
        .ok_or_else(|| "no secret configured for tenant".to_string())?;

    let conn = HdbTenantConnection::connect(&cfg.conn_str, &cfg.user, &password)
        .await
        .map_err(|e| e.to_string())?;
    let conn: Arc<dyn TenantConnection> = Arc::new(conn);

    let usage_rs = conn
        .query("select usage from sys.m_database", timeout)
        .await
        .map_err(|e| e.to_string())?;
    let usage = first_text(&usage_rs).ok_or("usage query returned no rows")?;

    let mut schemas = vec!["sys".to_string()];
    let privileges_sql = format!(
        "select schema_name from sys.granted_privileges where object_type='SCHEMA' and grantee='{}'",
        cfg.user.to_uppercase()
    );
    let privileges_rs = conn
        .query(&privileges_sql, timeout)
        .await
        .map_err(|e| e.to_string())?;
    for row in &privileges_rs.rows {
        if let Some(cell) = row.first() {
            schemas.push(crate::coerce::to_string_lossy(cell));
        }
    }

    let metadata_rs = conn
        .query(METADATA_QUERY, timeout)
        .await
        .map_err(|e| e.to_string())?;
    let row = metadata_rs
        .rows
        .first()
        .ok_or("metadata query returned no rows")?;
    if row.len() < 4 {
        return Err("metadata query returned too few columns".to_string());
    }
    let sid = crate::coerce::to_string_lossy(&row[0]);
    let instance_number = crate::coerce::to_string_lossy(&row[1]);
    let database_name = crate::coerce::to_string_lossy(&row[2]);
    let version = crate::coerce::to_string_lossy(&row[3]);

    Ok(Tenant {
        name: cfg.name.clone(),
        tags: cfg.tags.clone(),
        usage,
        schemas,
        sid,
        instance_number,
        database_name,
        version,
        state: TenantState::Prepared,
        conn,
    })
}

fn first_text(rs: &crate::driver::ResultSet) -> Option<String> {
    rs.rows
        .first()
        .and_then(|row| row.first())
        .map(crate::coerce::to_string_lossy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::CellValue;
    use crate::driver::{DriverError, ResultSet};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedConnection {
        responses: Mutex<HashMap<String, ResultSet>>,
    }

    #[async_trait]
    impl TenantConnection for ScriptedConnection {
        async fn query(&self, sql: &str, _timeout: Duration) -> Result<ResultSet, DriverError> {
            let mut responses = self.responses.lock().unwrap();
            for (key, _) in responses.iter() {
                if sql.contains(key.as_str()) {
                    let key = key.clone();
                    let rs = responses.remove(&key).unwrap();
                    return Ok(rs);
                }
            }
            Err(DriverError::Query(format!("unscripted query: {sql}")))
        }

        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    struct FixedSecrets(HashMap<String, String>);

    impl SecretStore for FixedSecrets {
        fn password_for(&self, tenant: &str) -> Option<String> {
            self.0.get(tenant).cloned()
        }
    }

    #[test]
    fn missing_secret_is_a_prepare_error_description() {
        let secrets = FixedSecrets(HashMap::new());
        assert!(secrets.password_for("acme").is_none());
    }

    #[test]
    fn first_text_reads_first_cell_of_first_row() {
        let rs = ResultSet {
            columns: vec!["usage".into()],
            rows: vec![vec![CellValue::Text("PRODUCTION".into())]],
        };
        assert_eq!(first_text(&rs).as_deref(), Some("PRODUCTION"));
    }

    #[test]
    fn first_text_empty_result_set_is_none() {
        let rs = ResultSet {
            columns: vec!["usage".into()],
            rows: vec![],
        };
        assert_eq!(first_text(&rs), None);
    }
}
