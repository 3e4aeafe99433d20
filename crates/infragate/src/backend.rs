//! Assembles the proxy of the configured backend

use anyhow::Context;
use infragate_config::{BackendKind, GatewayConfig};
use infragate_core::BackendProxy;
use infragate_dummy::DummyBackend;
use infragate_nebula::{NebulaBackend, NebulaSettings, OneCli};
use std::sync::Arc;

pub async fn build_proxy(config: &GatewayConfig) -> anyhow::Result<BackendProxy> {
    tracing::debug!("Assembling {} backend", config.backend);

    let proxy = match config.backend {
        BackendKind::Dummy => {
            let backend = DummyBackend::load(config.dummy.fixtures_dir.as_deref())
                .await
                .context("loading dummy fixtures")?;
            backend.proxy().await?
        }
        BackendKind::Nebula => nebula(config)?.proxy().await?,
        BackendKind::Ec2 => ec2(config).await?,
    };

    tracing::info!(
        "Serving {} kinds from the {} backend",
        proxy.served_kinds().len(),
        proxy.backend()
    );
    Ok(proxy)
}

fn nebula(config: &GatewayConfig) -> anyhow::Result<NebulaBackend> {
    let nebula = &config.nebula;

    let mut cli = OneCli::new();
    if let Some(dir) = &nebula.bin_dir {
        cli = cli.with_bin_dir(dir);
    }
    if let Some(endpoint) = &nebula.endpoint {
        cli = cli.with_endpoint(endpoint);
    }
    if let Some(user) = &nebula.user {
        cli = cli
            .with_credentials(user, nebula.password.clone())
            .context("writing the OpenNebula auth file")?;
    }

    let defaults = NebulaSettings::default();
    let settings = NebulaSettings {
        region: nebula.region.clone(),
        datastore: nebula.datastore.clone().unwrap_or(defaults.datastore),
        wait: config.wait.clone(),
    };
    Ok(NebulaBackend::new(Arc::new(cli), settings))
}

#[cfg(feature = "ec2")]
async fn ec2(config: &GatewayConfig) -> anyhow::Result<BackendProxy> {
    use infragate_ec2::{Ec2Backend, Ec2Settings, SdkEc2};

    let ec2 = &config.ec2;
    let api = SdkEc2::connect(ec2.region.clone()).await;

    let defaults = Ec2Settings::default();
    let settings = Ec2Settings {
        region: ec2.region.clone().unwrap_or(defaults.region),
        availability_zone: ec2.availability_zone.clone(),
        network_create_allowed: ec2.network_create_allowed,
        image_owners: ec2.image_owners.clone(),
        instance_types: ec2.instance_types.clone(),
        wait: config.wait.clone(),
    };
    Ok(Ec2Backend::new(Arc::new(api), settings).proxy().await?)
}

#[cfg(not(feature = "ec2"))]
async fn ec2(_config: &GatewayConfig) -> anyhow::Result<BackendProxy> {
    anyhow::bail!("this build has no EC2 support; rebuild with `--features ec2`")
}
