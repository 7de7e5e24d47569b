//! Integration tests for the node lifecycle.
//!
//! Nodes are created through the registry and driven with the lifecycle
//! driver against in-memory runtime and host doubles.

use std::sync::Arc;
use std::time::Duration;

use labnode_nodes::{
    deploy_node, init_node, peer_configs, run_phase, MockConfigSaver, MockHost, NodeError,
    NodeOption, NodeRegistry, PeerConfigs, Phase, PreDeployParams, IMAGE_KEY,
};
use labnode_runtime::{MockRuntime, NodeConfig};
use tokio_util::sync::CancellationToken;

fn registry() -> NodeRegistry {
    NodeRegistry::with_builtin_kinds().expect("builtin kinds register")
}

/// Bridge with no pre-existing rule ends up with exactly one ACCEPT rule.
#[tokio::test]
async fn test_bridge_deploy_installs_single_rule() {
    let _ = labnode_common::init_logging("debug");
    let ctx = CancellationToken::new();
    let host = Arc::new(MockHost::new().with_bridge("br-mgmt"));

    let cfg = NodeConfig::new("br-mgmt", "br-mgmt", "bridge");
    let mut node = init_node(&registry(), cfg, vec![NodeOption::Host(host.clone())]).unwrap();

    deploy_node(node.as_mut(), &ctx, &PreDeployParams::default(), &PeerConfigs::new())
        .await
        .unwrap();
    assert_eq!(host.accept_rule_count("br-mgmt"), 1);

    // A second post_deploy finds the rule and leaves the chain alone.
    node.post_deploy(&ctx, &PeerConfigs::new()).await.unwrap();
    assert_eq!(host.accept_rule_count("br-mgmt"), 1);
    assert!(host.forward_listing().contains("ACCEPT"));
}

/// A missing host bridge aborts the deployment before any rule is touched.
#[tokio::test]
async fn test_bridge_missing_on_host() {
    let ctx = CancellationToken::new();
    let host = Arc::new(MockHost::new());

    let cfg = NodeConfig::new("br-data", "br-data", "bridge");
    let mut node = init_node(&registry(), cfg, vec![NodeOption::Host(host.clone())]).unwrap();

    let err = deploy_node(node.as_mut(), &ctx, &PreDeployParams::default(), &PeerConfigs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::BridgeNotFound { ref name, .. } if name == "br-data"));
    assert!(host.iptables_calls().is_empty());
}

/// A VM that never signals readiness must not hang post_deploy past cancellation.
#[tokio::test]
async fn test_linux_vm_readiness_cancelled() {
    let ctx = CancellationToken::new();
    let runtime = Arc::new(MockRuntime::vm_backed());
    let host = Arc::new(MockHost::new());

    let cfg = NodeConfig::new("vm1", "clab-lab-vm1", "linux").with_image("alpine:3");
    let mut node = init_node(
        &registry(),
        cfg,
        vec![NodeOption::Runtime(runtime), NodeOption::Host(host)],
    )
    .unwrap();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    // The runtime holds the boot notifier, so the wait can only end through cancellation.
    let params = PreDeployParams::default();
    let peers = PeerConfigs::new();
    let deploy = deploy_node(node.as_mut(), &ctx, &params, &peers);
    let res = tokio::time::timeout(Duration::from_secs(5), deploy).await;

    let err = res.expect("post_deploy hung").unwrap_err();
    assert!(err.is_cancelled());
}

/// A VM that signals readiness lets post_deploy complete.
#[tokio::test]
async fn test_linux_vm_boot_completes() {
    let ctx = CancellationToken::new();
    let runtime = Arc::new(MockRuntime::vm_backed());

    let cfg = NodeConfig::new("vm2", "clab-lab-vm2", "linux").with_image("alpine:3");
    let mut node = init_node(
        &registry(),
        cfg,
        vec![
            NodeOption::Runtime(runtime.clone()),
            NodeOption::Host(Arc::new(MockHost::new())),
        ],
    )
    .unwrap();
    assert_eq!(node.get_images().len(), 3);

    let params = PreDeployParams::default();
    let peers = PeerConfigs::new();
    let deploy = deploy_node(node.as_mut(), &ctx, &params, &peers);
    let (res, ()) = tokio::join!(deploy, async {
        loop {
            if let Some(notifier) = runtime.take_boot_notifier("clab-lab-vm2") {
                notifier.boot_finished();
                break;
            }
            tokio::task::yield_now().await;
        }
    });

    res.unwrap();
    assert_eq!(node.config().deployment_status, "created");
}

/// XRd renders the management gateway into its first-boot config.
#[tokio::test]
async fn test_xrd_first_boot_config_has_gateway() {
    let ctx = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let lab_dir = dir.path().join("xrd1");
    let runtime = Arc::new(MockRuntime::new().with_mgmt("172.30.0.1", "3fff:172:30::1"));

    let cfg = NodeConfig::new("xrd1", "clab-lab-xrd1", "xrd")
        .with_image("ios-xr/xrd-control-plane:7.8.1")
        .with_lab_dir(lab_dir.to_string_lossy())
        .with_endpoint("Gi0-0-0-0");
    let mut node = init_node(
        &registry(),
        cfg,
        vec![
            NodeOption::Runtime(runtime.clone()),
            NodeOption::Host(Arc::new(MockHost::new())),
        ],
    )
    .unwrap();

    deploy_node(node.as_mut(), &ctx, &PreDeployParams::default(), &PeerConfigs::new())
        .await
        .unwrap();

    let first_boot = std::fs::read_to_string(lab_dir.join("first-boot.cfg")).unwrap();
    assert!(first_boot.contains("hostname xrd1"));
    assert!(first_boot.contains("MgmtEth0/RP0/CPU0/0 172.30.0.1"));
    assert!(first_boot.contains("MgmtEth0/RP0/CPU0/0 3fff:172:30::1"));
    assert!(lab_dir.join("xr-storage").is_dir());
    assert_eq!(runtime.container_count(), 1);
    assert_eq!(node.get_images()[IMAGE_KEY], "ios-xr/xrd-control-plane:7.8.1");

    node.delete(&ctx).await.unwrap();
    assert_eq!(runtime.container_count(), 0);
}

/// Bad XRd interface names fail the deployment checks.
#[tokio::test]
async fn test_xrd_bad_interface_name_stops_deploy() {
    let ctx = CancellationToken::new();
    let runtime = Arc::new(MockRuntime::new());

    let cfg = NodeConfig::new("xrd2", "clab-lab-xrd2", "cisco_xrd")
        .with_lab_dir("/nonexistent/xrd2")
        .with_endpoint("eth1");
    let mut node = init_node(
        &registry(),
        cfg,
        vec![
            NodeOption::Runtime(runtime.clone()),
            NodeOption::Host(Arc::new(MockHost::new())),
        ],
    )
    .unwrap();

    let err = deploy_node(node.as_mut(), &ctx, &PreDeployParams::default(), &PeerConfigs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::InvalidInterfaceName { ref name, .. } if name == "eth1"));
    assert_eq!(runtime.container_count(), 0);
}

/// XRd save_config uses the kind's default credentials from the registry.
#[tokio::test]
async fn test_xrd_save_config_with_registry_credentials() {
    let ctx = CancellationToken::new();
    let saver = Arc::new(MockConfigSaver::new());

    let cfg = NodeConfig::new("xrd3", "clab-lab-xrd3", "xrd").with_lab_dir("/lab/xrd3");
    let node = init_node(&registry(), cfg, vec![NodeOption::ConfigSaver(saver.clone())]).unwrap();

    node.save_config(&ctx).await.unwrap();

    let requests = saver.requests();
    let req = &requests[0];
    assert_eq!(req.address, "clab-lab-xrd3");
    assert_eq!((req.username.as_str(), req.password.as_str()), ("clab", "clab@123"));
    assert_eq!(req.platform, "cisco_iosxr");
}

/// Phases run across mixed kinds; exec support is reported per kind.
#[tokio::test]
async fn test_mixed_topology_phases() {
    let ctx = CancellationToken::new();
    let registry = registry();
    let runtime = Arc::new(MockRuntime::new());
    let host = Arc::new(MockHost::new().with_bridge("br0"));

    let opts = || {
        vec![
            NodeOption::Runtime(runtime.clone()),
            NodeOption::Host(host.clone()),
        ]
    };
    let mut nodes = vec![
        init_node(&registry, NodeConfig::new("br0", "br0", "bridge"), opts()).unwrap(),
        init_node(
            &registry,
            NodeConfig::new("srv1", "clab-lab-srv1", "linux").with_image("alpine:3"),
            opts(),
        )
        .unwrap(),
    ];
    let peers = peer_configs(&nodes);
    let params = PreDeployParams::new("mixed");

    for phase in Phase::DEPLOY {
        for (name, res) in run_phase(&mut nodes, phase, &ctx, &params, &peers).await {
            assert!(res.is_ok(), "{phase} failed for {name}: {res:?}");
        }
    }
    assert_eq!(runtime.container_count(), 1);
    assert_eq!(host.accept_rule_count("br0"), 1);
    assert_eq!(host.offload_disabled(), vec!["srv1".to_string()]);

    let cmd = labnode_runtime::ExecCmd::from_string("ip addr");
    assert!(nodes[0].run_exec(&ctx, &cmd).await.unwrap_err().is_not_supported());
    assert!(nodes[1].run_exec(&ctx, &cmd).await.is_ok());

    let results = run_phase(&mut nodes, Phase::Delete, &ctx, &params, &peers).await;
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(runtime.container_count(), 0);
}

/// Registry rejects duplicate names and reports unknown kinds.
#[test]
fn test_registry_duplicates_and_unknown() {
    let mut registry = registry();

    let err = registry
        .register(&["xrd"], || Box::new(labnode_nodes::Linux::default()), None)
        .unwrap_err();
    assert!(matches!(err, NodeError::DuplicateKind(ref n) if n == "xrd"));

    assert!(registry.lookup("srl").is_none());
    assert!(matches!(registry.new_node("srl"), Err(NodeError::UnknownKind(_))));
    assert_eq!(registry.kinds(), vec!["bridge", "cisco_xrd", "linux", "xrd"]);
}
