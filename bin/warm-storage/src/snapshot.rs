//! Snapshot and registry loading shared by the inspection commands

use alloy_primitives::Address;
use eyre::WrapErr;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use warm_storage_service::{InMemoryProviderRegistry, ServiceState, StateSnapshot};

/// Provider entry of a registry file, registered in file order
#[derive(Debug, Deserialize)]
struct RegistryEntry {
    service_provider: Address,
    payee: Address,
}

/// Build a registry from a JSON list of providers
pub(crate) fn load_registry(path: Option<&Path>) -> eyre::Result<InMemoryProviderRegistry> {
    let mut registry = InMemoryProviderRegistry::new();
    let Some(path) = path else {
        return Ok(registry);
    };

    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read registry {}", path.display()))?;
    let entries: Vec<RegistryEntry> = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("failed to parse registry {}", path.display()))?;
    for entry in entries {
        let id = registry.register(entry.service_provider, entry.payee);
        debug!(target: "warm_storage::cli", id, provider = %entry.service_provider, "registered provider");
    }
    Ok(registry)
}

/// Load a snapshot of any supported version as current state
pub(crate) fn load_state(snapshot: &Path, registry: Option<&Path>) -> eyre::Result<ServiceState> {
    let raw = std::fs::read_to_string(snapshot)
        .wrap_err_with(|| format!("failed to read snapshot {}", snapshot.display()))?;
    let snapshot = StateSnapshot::from_json(&raw)?;
    let version = snapshot.version();
    let state = snapshot.into_current(&load_registry(registry)?)?;
    info!(
        target: "warm_storage::cli",
        version,
        data_sets = state.data_sets.len(),
        "loaded state snapshot"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, StateSnapshot::V2(ServiceState::default()).to_json().unwrap()).unwrap();

        let state = load_state(&path, None).unwrap();
        assert!(state.data_sets.is_empty());
    }

    #[test]
    fn test_registry_file_order_assigns_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"[
                {"service_provider": "0x2020202020202020202020202020202020202020", "payee": "0x2121212121212121212121212121212121212121"},
                {"service_provider": "0x3030303030303030303030303030303030303030", "payee": "0x3030303030303030303030303030303030303030"}
            ]"#,
        )
        .unwrap();

        let registry = load_registry(Some(&path)).unwrap();
        assert_eq!(registry.provider(2).unwrap().service_provider, Address::repeat_byte(0x30));
        assert_eq!(registry.provider(1).unwrap().payee, Address::repeat_byte(0x21));
    }
}
