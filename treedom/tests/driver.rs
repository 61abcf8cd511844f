use treedom::{
    Driver, LoadError, Loader, NodeId, NodeRecord, StaticRecords, Tree, TreeOptions,
};

use async_trait::async_trait;

fn records() -> StaticRecords {
    StaticRecords::new(vec![
        NodeRecord::new("docs", "Documents").inner(),
        NodeRecord::new("ext", "External").inner().source("alt"),
    ])
    .branch(
        "docs",
        vec![NodeRecord::new("notes", "notes.txt").leaf()],
    )
}

async fn settle_by_stepping(driver: &mut Driver) {
    let mut steps = 0;
    while driver.tree().queue_busy() {
        driver.step(std::time::Instant::now());
        // Let spawned fetch tasks run between steps.
        tokio::task::yield_now().await;
        steps += 1;
        assert!(steps < 1000, "driver did not settle");
    }
}

// ============================================================================
// Loader bridging
// ============================================================================

#[tokio::test(flavor = "current_thread")]
async fn test_driver_resolves_loads_through_the_loader() {
    let mut driver = Driver::new(Tree::new(TreeOptions::new()), records());
    let root = driver.tree().root_id();

    driver.tree_mut().load(&root);
    driver.run_until_idle().await;
    assert_eq!(driver.tree().len(), 2);

    driver.tree_mut().open(&NodeId::new("docs"));
    driver.run_until_idle().await;

    let tree = driver.into_tree();
    assert!(tree.node(&NodeId::new("docs")).unwrap().open);
    assert!(tree.contains(&NodeId::new("notes")));
    assert!(!tree.queue_busy());
}

#[tokio::test(flavor = "current_thread")]
async fn test_driver_routes_source_overrides() {
    struct AltLoader;

    #[async_trait]
    impl Loader for AltLoader {
        async fn fetch(&self, node: Option<&NodeId>) -> Result<Vec<NodeRecord>, LoadError> {
            match node.map(NodeId::as_str) {
                Some("ext") => Ok(vec![NodeRecord::new("ext/a", "From alt").leaf()]),
                _ => Err(LoadError::new("alt loader asked for unknown node")),
            }
        }
    }

    let mut driver = Driver::new(Tree::new(TreeOptions::new()), records()).source("alt", AltLoader);
    let root = driver.tree().root_id();

    driver.tree_mut().load(&root);
    driver.run_until_idle().await;
    driver.tree_mut().open(&NodeId::new("ext"));
    driver.run_until_idle().await;

    let tree = driver.tree();
    assert!(tree.node(&NodeId::new("ext")).unwrap().open);
    // Children came from the alternate loader, not the default table.
    assert!(tree.contains(&NodeId::new("ext/a")));
}

#[tokio::test(flavor = "current_thread")]
async fn test_driver_step_drives_the_tree_incrementally() {
    let mut driver = Driver::new(Tree::new(TreeOptions::new()), records());
    let root = driver.tree().root_id();

    driver.tree_mut().load(&root);
    settle_by_stepping(&mut driver).await;
    assert_eq!(driver.tree().len(), 2);

    driver.tree_mut().open(&NodeId::new("docs"));
    settle_by_stepping(&mut driver).await;

    let tree = driver.tree();
    assert!(tree.node(&NodeId::new("docs")).unwrap().open);
    assert!(tree.contains(&NodeId::new("notes")));
}

#[tokio::test(flavor = "current_thread")]
async fn test_driver_surfaces_loader_errors() {
    struct FailingLoader;

    #[async_trait]
    impl Loader for FailingLoader {
        async fn fetch(&self, _node: Option<&NodeId>) -> Result<Vec<NodeRecord>, LoadError> {
            Err(LoadError::new("backend down"))
        }
    }

    let mut driver = Driver::new(Tree::new(TreeOptions::new()), FailingLoader);
    let root = driver.tree().root_id();

    driver.tree_mut().load(&root);
    driver.run_until_idle().await;

    let tree = driver.tree();
    assert!(tree.is_empty());
    assert!(!tree.node(&root).unwrap().is_loaded());
    assert!(!tree.queue_busy());
}
