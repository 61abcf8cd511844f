//! Console walkthrough: load a small outline, open a few branches, print the
//! visible rows.
//!
//! Run with `cargo run --example outline`.

use std::fs::File;
use std::ops::ControlFlow;

use log::LevelFilter;
use simplelog::{Config, WriteLogger};
use treedom::{
    Driver, EventKind, NodeId, NodeRecord, OpOptions, StaticRecords, Tree, TreeOptions,
};

fn records() -> StaticRecords {
    StaticRecords::new(vec![
        NodeRecord::new("docs", "Documents").inner(),
        NodeRecord::new("music", "Music").inner(),
        NodeRecord::new("readme", "README.md").leaf(),
    ])
    .branch(
        "docs",
        vec![
            NodeRecord::new("docs/reports", "Reports").inner(),
            NodeRecord::new("docs/notes", "notes.txt").leaf(),
        ],
    )
    .branch(
        "docs/reports",
        vec![
            NodeRecord::new("docs/reports/q1", "q1.pdf").leaf(),
            NodeRecord::new("docs/reports/q2", "q2.pdf").leaf(),
        ],
    )
    .branch(
        "music",
        vec![NodeRecord::new("music/album", "album.flac").leaf()],
    )
}

fn print_outline(tree: &Tree) {
    for id in tree.visible_nodes() {
        if let Some(node) = tree.node(&id) {
            let marker = if node.is_leaf() {
                "  "
            } else if node.open {
                "v "
            } else {
                "> "
            };
            println!(
                "{:indent$}{}{}",
                "",
                marker,
                node.label,
                indent = (node.depth as usize - 1) * 2
            );
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Ok(log_file) = File::create("outline.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, Config::default(), log_file);
    }

    let mut tree = Tree::new(TreeOptions::new());
    tree.subscribe(EventKind::Loaded, |notice| {
        println!("loaded: {:?}", notice.target.map(NodeId::as_str));
        ControlFlow::Continue(())
    });

    let mut driver = Driver::new(tree, records());

    // Fetch the top level, then drill into the reports branch.
    let root = driver.tree().root_id();
    driver.tree_mut().load(&root);
    driver.run_until_idle().await;

    // The reports node only exists once its parent's records arrive, so
    // the second open chains off the first one's terminal.
    driver.tree_mut().open_with(
        &NodeId::new("docs"),
        OpOptions::new().on_success(|tree, _| {
            println!("documents branch open");
            tree.open(&NodeId::new("docs/reports"));
        }),
    );
    driver.run_until_idle().await;

    println!();
    print_outline(driver.tree());
}
