//! # Driver Assembly (C7)
//!
//! Wires configuration into one provider adapter plus C4/C5/C6, and owns
//! their start/stop lifecycle (spec §4.7).

use crate::config::DaemonConfig;
use crate::driver::FetchDriver;
use crate::locator::LocatorStyle;
use crate::orchestrator::{KubeOrchestrator, OrchestratorClient};
use crate::provider::{aws::AwsProvider, azure::AzureProvider, gcp::GcpProvider, vault::VaultProvider, SecretProvider};
use crate::registry::Registry;
use crate::rotation::RotationEngine;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub struct DriverAssembly {
    pub driver: Arc<FetchDriver>,
    provider: Arc<dyn SecretProvider>,
    orchestrator: Arc<dyn OrchestratorClient>,
    rotation_enabled: bool,
    rotation_handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl DriverAssembly {
    /// Instantiate exactly one adapter per `config.provider_id` (spec §4.7
    /// "instantiate exactly one adapter").
    pub async fn build(config: &DaemonConfig) -> anyhow::Result<Self> {
        let (provider, style, locator_label, field_label, mount): (
            Arc<dyn SecretProvider>,
            LocatorStyle,
            &'static str,
            &'static str,
            String,
        ) = match config.provider_id.as_str() {
            "vault" => {
                let p = VaultProvider::init(&config.provider_config, "vault").await?;
                let mount = config.provider_config.get("VAULT_MOUNT").cloned().unwrap_or_else(|| "secret".to_string());
                (Arc::new(p), LocatorStyle::KvHierarchy, "vault_path", "vault_field", mount)
            }
            "openbao" => {
                let p = VaultProvider::init(&config.provider_config, "openbao").await?;
                let mount = config.provider_config.get("OPENBAO_MOUNT").cloned().unwrap_or_else(|| "secret".to_string());
                (Arc::new(p), LocatorStyle::KvHierarchy, "openbao_path", "openbao_field", mount)
            }
            "aws" => {
                let p = AwsProvider::init(&config.provider_config).await?;
                (Arc::new(p), LocatorStyle::FlatNamespace, "aws_secret_name", "aws_field", String::new())
            }
            "gcp" => {
                let p = GcpProvider::init(&config.provider_config).await?;
                (Arc::new(p), LocatorStyle::ResourceIdStyle, "gcp_secret_name", "gcp_field", String::new())
            }
            "azure" => {
                let p = AzureProvider::init(&config.provider_config).await?;
                (Arc::new(p), LocatorStyle::KeyVaultStyle, "azure_secret_name", "azure_field", String::new())
            }
            other => anyhow::bail!("unknown SECRETS_PROVIDER {other:?}"),
        };

        let orchestrator: Arc<dyn OrchestratorClient> = Arc::new(KubeOrchestrator::connect().await?);
        let registry = Arc::new(Registry::new());

        let driver = Arc::new(FetchDriver::new(
            provider.clone(),
            registry.clone(),
            config.rotation_enabled,
            style,
            locator_label,
            field_label,
            mount,
        ));

        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        let mut assembly = Self {
            driver,
            provider,
            orchestrator,
            rotation_enabled: config.rotation_enabled,
            rotation_handle: None,
            shutdown_tx,
        };

        // Spawn the rotation loop only if both the global switch is on AND
        // the adapter reports rotation support (spec §4.7).
        if config.rotation_enabled && assembly.provider.supports_rotation() {
            let engine = RotationEngine::new(
                assembly.provider.clone(),
                assembly.orchestrator.clone(),
                registry,
                config.rotation_interval,
            )
            .with_pruning(config.prune_stale_records, config.prune_after_ticks);
            let rx = assembly.shutdown_tx.subscribe();
            assembly.rotation_handle = Some(tokio::spawn(async move {
                engine.run(rx).await;
            }));
            info!(interval = ?config.rotation_interval, "rotation engine started");
        } else {
            info!("rotation engine not started (disabled or unsupported by provider)");
        }

        Ok(assembly)
    }

    /// Cancel the rotation loop, await its termination, then close the
    /// adapter and the orchestrator client (spec §4.7 "On shutdown").
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.rotation_handle.take() {
            let _ = handle.await;
        }
        self.provider.close().await;
        info!("driver assembly shut down");
    }
}
