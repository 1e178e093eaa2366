//! Secret store: the out-of-core collaborator that resolves a tenant
//! name to its connection password (spec.md §6). Missing entries cause
//! that tenant's preparation to fail, never a process-wide failure.

use std::collections::HashMap;
use std::env;

/// `GetSecretMap()` as a trait, so the exporter can be pointed at either
/// environment variables (the default) or a file-backed map without
/// touching `tenant::prepare_tenants`.
pub trait SecretStore: Send + Sync {
    fn password_for(&self, tenant: &str) -> Option<String>;
}

/// Resolves `HANA_EXPORTER_PASSWORD_<TENANT>` (tenant name uppercased,
/// non-alphanumeric characters replaced with `_`), matching the
/// convention the teacher uses for its own credential env vars.
pub struct EnvSecretStore;

impl EnvSecretStore {
    fn env_key(tenant: &str) -> String {
        let sanitized: String = tenant
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("HANA_EXPORTER_PASSWORD_{sanitized}")
    }
}

impl SecretStore for EnvSecretStore {
    fn password_for(&self, tenant: &str) -> Option<String> {
        env::var(Self::env_key(tenant)).ok()
    }
}

/// A fixed map, used by the `convert` subcommand's dry runs and by tests;
/// also usable for a file-backed secret map loaded once at startup.
pub struct MapSecretStore(pub HashMap<String, String>);

impl SecretStore for MapSecretStore {
    fn password_for(&self, tenant: &str) -> Option<String> {
        self.0.get(tenant).cloned()
    }
}
