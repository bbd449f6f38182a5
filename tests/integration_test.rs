// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::Write;
use std::sync::Arc;

use vsphere_api_rs::config::VsphereConfig;
use vsphere_api_rs::runtime::{LoggingConfig, RetryConfig};
use vsphere_api_rs::testkit::{FakeConnector, FakeSession};
use vsphere_api_rs::{Context, ExtraConfig, VsphereClient, VsphereClientConfig, VsphereError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_inventory_lifecycle() -> anyhow::Result<()> {
    init_tracing();
    let fake = Arc::new(FakeSession::standard());
    let connector = FakeConnector::new(fake.clone());
    let ctx = Context::background();

    println!("========================================");
    println!("  vSphere Lifecycle Test Suite");
    println!("========================================");

    let config = VsphereClientConfig::builder("vcenter.example.com", "dc0")
        .logging(LoggingConfig::verbose())
        .wait_max_seconds(10)
        .build();
    let client = VsphereClient::dial(&ctx, &connector, config).await?;

    println!("\n--- Enumeration ---");
    let datastores = client.datastores(&ctx).await?;
    for ds in &datastores {
        println!("✓ datastore {} accessible={}", ds.name, ds.accessible);
    }
    assert_eq!(datastores.len(), 2);

    let compute = client.compute_resources(&ctx).await?;
    println!("✓ {} compute resources", compute.len());
    assert_eq!(compute.len(), 2);

    let networks = client.networks(&ctx).await?;
    println!("✓ {} networks", networks.len());
    assert_eq!(networks.iter().filter(|n| n.is_distributed()).count(), 1);

    println!("\n--- Folders ---");
    let cluster = client.ensure_folder(&ctx, "clusters/prod").await?;
    println!("✓ ensured clusters/prod ({cluster})");
    assert_eq!(client.ensure_folder(&ctx, "clusters/prod").await?, cluster);

    let vms: Vec<_> = client
        .virtual_machines(&ctx, "foo/bar/*")
        .await?
        .into_iter()
        .map(|vm| vm.reference)
        .collect();
    client.move_vms_into(&ctx, "clusters/prod", &vms).await?;
    println!("✓ moved {} VMs into clusters/prod", vms.len());

    client
        .update_virtual_machine_extra_config(
            &ctx,
            &vms[0],
            ExtraConfig::new().set("guestinfo.cluster", "prod"),
        )
        .await?;
    println!("✓ tagged {}", vms[0]);

    client.move_folder(&ctx, "clusters", "foo").await?;
    let moved = client
        .virtual_machines(&ctx, "foo/clusters/prod/*")
        .await?;
    assert_eq!(moved.len(), 2);
    println!("✓ moved clusters under foo");

    println!("\n--- Teardown ---");
    client
        .remove_virtual_machines(&ctx, "foo/clusters/prod/*")
        .await?;
    println!("✓ removed VMs");
    client.destroy_folder_tree(&ctx, "foo").await?;
    println!("✓ destroyed foo");
    client
        .delete_datastore_file(&ctx, "[datastore2] vm-1/vm-1.vmdk")
        .await?;
    println!("✓ deleted leftover disk (already absent)");

    let err = client.virtual_machines(&ctx, "foo/*").await.unwrap_err();
    assert!(err.is_not_found());

    client.close(&ctx).await?;
    assert_eq!(fake.logout_count(), 1);
    assert_eq!(fake.open_collectors(), 0);
    println!("\n✓ session closed, {} collectors used", fake.created_collectors());

    let metrics = client.logger().metrics();
    println!(
        "calls: {} ok, {} failed",
        metrics.successful_calls(),
        metrics.failed_calls()
    );
    assert!(metrics.total_calls() > 0);
    Ok(())
}

#[tokio::test]
async fn test_dial_from_config_file() -> anyhow::Result<()> {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "context: lab\ncontexts:\n  lab:\n    endpoint: {}\n    datacenter: dc0\n",
        "vcenter.lab.example.com"
    )?;

    let config = VsphereConfig::load_from_path(file.path())?;
    let context = config
        .active_context()
        .ok_or_else(|| anyhow::anyhow!("no active context"))?;
    let mut client_config = context.client_config();
    client_config.retry = RetryConfig::disabled();

    let fake = Arc::new(FakeSession::standard());
    let connector = FakeConnector::new(fake);
    let ctx = Context::background();
    let client = VsphereClient::dial(&ctx, &connector, client_config).await?;

    assert_eq!(
        connector.endpoints()[0].as_str(),
        "https://vcenter.lab.example.com/sdk"
    );
    assert_eq!(client.datacenter(&ctx).await?.name, "dc0");
    Ok(())
}

#[tokio::test]
async fn test_errors_are_distinguishable() {
    init_tracing();
    let fake = Arc::new(FakeSession::standard());
    let connector = FakeConnector::new(fake.clone());
    let ctx = Context::background();
    let client = VsphereClient::dial(&ctx, &connector, VsphereClientConfig::new("vc", "dc0"))
        .await
        .unwrap();

    let missing = client.destroy_folder_tree(&ctx, "nope").await.unwrap_err();
    assert!(missing.is_not_found());

    let root = fake.lookup("/dc0/vm").unwrap();
    fake.add_folder(&root, "twin");
    fake.add_folder(&root, "twin");
    let ambiguous = client.move_folder(&ctx, "twin", "foo").await.unwrap_err();
    assert!(matches!(
        ambiguous.root(),
        VsphereError::AmbiguousPath { matches: 2, .. }
    ));

    client.close(&ctx).await.unwrap();
    assert!(matches!(
        client.ensure_folder(&ctx, "x").await,
        Err(VsphereError::SessionClosed)
    ));
}
