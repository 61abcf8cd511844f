use std::cell::RefCell;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::{Duration, Instant};

use treedom::{
    EventKind, LoadError, LoadState, NodeId, NodeRecord, OpOptions, Outcome, Tree, TreeError,
    TreeOptions,
};

// ============================================================================
// Helpers
// ============================================================================

/// Tick and resolve fetches until the queue drains. Time advances one
/// second per tick so delayed retries come due.
fn drive(tree: &mut Tree, fetch: &dyn Fn(Option<&NodeId>) -> Result<Vec<NodeRecord>, LoadError>) {
    let mut now = Instant::now() + Duration::from_secs(3600);
    for _ in 0..1000 {
        let started = tree.tick(now);
        now += Duration::from_secs(1);
        for request in tree.take_load_requests() {
            let result = fetch(request.node.as_ref());
            tree.resolve_load(request.ticket, result);
        }
        if !started && !tree.queue_busy() {
            return;
        }
    }
    panic!("tree did not settle");
}

/// Three top-level entries; `docs` and `music` load on demand.
fn fetch(node: Option<&NodeId>) -> Result<Vec<NodeRecord>, LoadError> {
    match node.map(NodeId::as_str) {
        None => Ok(vec![
            NodeRecord::new("docs", "Documents").inner(),
            NodeRecord::new("music", "Music").inner(),
            NodeRecord::new("readme", "README.md").leaf(),
        ]),
        Some("docs") => Ok(vec![
            NodeRecord::new("reports", "Reports").inner(),
            NodeRecord::new("notes", "notes.txt").leaf(),
        ]),
        Some("reports") => Ok(vec![
            NodeRecord::new("q1", "q1.pdf").leaf(),
            NodeRecord::new("q2", "q2.pdf").leaf(),
        ]),
        Some("music") => Ok(vec![NodeRecord::new("album", "album.flac").leaf()]),
        Some(other) => Err(LoadError::new(format!("no records for '{other}'"))),
    }
}

fn loaded_tree(opts: TreeOptions) -> Tree {
    let mut tree = Tree::new(opts);
    let root = tree.root_id();
    tree.load(&root);
    drive(&mut tree, &fetch);
    tree
}

fn record_events(tree: &mut Tree, kinds: &[EventKind]) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for &kind in kinds {
        let log = Rc::clone(&log);
        tree.subscribe(kind, move |notice| {
            log.borrow_mut().push(format!(
                "{} {}",
                notice.event,
                notice.target.map(NodeId::as_str).unwrap_or("-")
            ));
            ControlFlow::Continue(())
        });
    }
    log
}

fn outcomes() -> Rc<RefCell<Vec<Outcome>>> {
    Rc::default()
}

fn capture(outcomes: &Rc<RefCell<Vec<Outcome>>>) -> OpOptions {
    let success = Rc::clone(outcomes);
    let fail = Rc::clone(outcomes);
    let notify = Rc::clone(outcomes);
    OpOptions::new()
        .on_success(move |_, outcome| success.borrow_mut().push(outcome.clone()))
        .on_fail(move |_, outcome| fail.borrow_mut().push(outcome.clone()))
        .on_notify(move |_, outcome| notify.borrow_mut().push(outcome.clone()))
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_root_materializes_top_level() {
    let tree = loaded_tree(TreeOptions::new());
    let root = tree.root_id();

    assert_eq!(tree.len(), 3);
    let children = tree.children(&root).unwrap();
    let ids: Vec<&str> = children.iter().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["docs", "music", "readme"]);
    assert!(tree.node(&root).unwrap().is_loaded());

    let docs = tree.node(&NodeId::new("docs")).unwrap();
    assert_eq!(docs.load_state, LoadState::Unloaded);
    assert_eq!(docs.depth, 1);
    assert!(docs.is_first);
    assert!(!docs.is_last);
    assert!(!docs.striped);
    let music = tree.node(&NodeId::new("music")).unwrap();
    assert!(music.striped);
    let readme = tree.node(&NodeId::new("readme")).unwrap();
    assert!(readme.is_last);
    assert!(readme.is_leaf());
    assert!(!readme.striped);
}

#[test]
fn test_load_failure_emits_load_failed_and_resets() {
    let mut tree = loaded_tree(TreeOptions::new());
    let log = record_events(&mut tree, &[EventKind::LoadFailed, EventKind::Opened]);
    let results = outcomes();
    let music = NodeId::new("music");

    // Serve an error for the music branch this time.
    let failing = |node: Option<&NodeId>| match node.map(NodeId::as_str) {
        Some("music") => Err(LoadError::new("backend down")),
        _ => fetch(node),
    };
    tree.open_with(&music, capture(&results));
    drive(&mut tree, &failing);

    assert_eq!(*log.borrow(), vec!["load_failed music"]);
    assert_eq!(results.borrow().len(), 1);
    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Load { .. })
    ));
    let music = tree.node(&music).unwrap();
    assert_eq!(music.load_state, LoadState::Unloaded);
    assert!(!music.open);
    assert!(!music.busy);
}

#[test]
fn test_reload_replaces_children() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);
    assert!(tree.contains(&NodeId::new("notes")));

    let fresh = |node: Option<&NodeId>| match node.map(NodeId::as_str) {
        Some("docs") => Ok(vec![NodeRecord::new("draft", "draft.md").leaf()]),
        _ => fetch(node),
    };
    tree.reload(&docs);
    drive(&mut tree, &fresh);

    assert!(!tree.contains(&NodeId::new("notes")));
    assert!(!tree.contains(&NodeId::new("reports")));
    let ids: Vec<&str> = tree.children(&docs).unwrap().iter().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["draft"]);
}

#[test]
fn test_reload_failure_keeps_children_and_loaded_state() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    let failing = |node: Option<&NodeId>| match node.map(NodeId::as_str) {
        Some("docs") => Err(LoadError::new("backend down")),
        _ => fetch(node),
    };
    let results = outcomes();
    tree.reload_with(&docs, capture(&results));
    drive(&mut tree, &failing);

    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Load { .. })
    ));
    let node = tree.node(&docs).unwrap();
    assert!(node.open);
    assert!(node.is_loaded());
    assert!(!node.busy);
    // The stale children survive the failed refresh.
    assert!(tree.contains(&NodeId::new("notes")));
    assert!(tree.contains(&NodeId::new("reports")));
}

#[test]
fn test_reload_veto_leaves_subtree_untouched() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    tree.subscribe(EventKind::BeforeLoad, |_| ControlFlow::Break(()));
    let results = outcomes();
    tree.reload_with(&docs, capture(&results));
    drive(&mut tree, &fetch);

    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Vetoed { event: EventKind::BeforeLoad, .. })
    ));
    let node = tree.node(&docs).unwrap();
    assert!(node.open);
    assert!(node.is_loaded());
    assert!(!node.busy);
    assert!(tree.contains(&NodeId::new("notes")));
    assert!(tree.contains(&NodeId::new("reports")));
}

#[test]
fn test_unload_discards_subtree() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    tree.unload(&docs).unwrap();

    assert!(!tree.contains(&NodeId::new("notes")));
    let docs_node = tree.node(&docs).unwrap();
    assert_eq!(docs_node.load_state, LoadState::Unloaded);
    assert!(!docs_node.open);
}

// ============================================================================
// Open / close
// ============================================================================

#[test]
fn test_open_chains_load_with_ordered_events() {
    let mut tree = loaded_tree(TreeOptions::new());
    let log = record_events(
        &mut tree,
        &[
            EventKind::BeforeOpen,
            EventKind::BeforeLoad,
            EventKind::Loaded,
            EventKind::Opened,
        ],
    );
    let results = outcomes();

    tree.open_with(&NodeId::new("docs"), capture(&results));
    drive(&mut tree, &fetch);

    assert_eq!(
        *log.borrow(),
        vec![
            "before_open docs",
            "before_load docs",
            "loaded docs",
            "opened docs",
        ]
    );
    assert_eq!(*results.borrow(), vec![Outcome::Success]);
    let docs = tree.node(&NodeId::new("docs")).unwrap();
    assert!(docs.open);
    assert!(docs.is_loaded());
    assert!(!docs.busy);
    assert_eq!(tree.children(&NodeId::new("docs")).unwrap().len(), 2);
}

#[test]
fn test_reopen_skips_the_load() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);
    tree.close(&docs);
    drive(&mut tree, &fetch);

    let log = record_events(&mut tree, &[EventKind::BeforeLoad, EventKind::Opened]);
    tree.open(&docs);
    drive(&mut tree, &fetch);

    assert_eq!(*log.borrow(), vec!["opened docs"]);
    assert!(tree.node(&docs).unwrap().open);
}

#[test]
fn test_open_already_open_is_notify_with_was_opened() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    let log = record_events(&mut tree, &[EventKind::WasOpened, EventKind::Opened]);
    let results = outcomes();
    tree.open_with(&docs, capture(&results));
    drive(&mut tree, &fetch);

    assert_eq!(*log.borrow(), vec!["was_opened docs"]);
    assert_eq!(*results.borrow(), vec![Outcome::Notify]);
}

#[test]
fn test_notify_falls_back_to_success_callback() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    let results = outcomes();
    let sink = Rc::clone(&results);
    tree.open_with(
        &docs,
        OpOptions::new().on_success(move |_, outcome| sink.borrow_mut().push(outcome.clone())),
    );
    drive(&mut tree, &fetch);

    assert_eq!(*results.borrow(), vec![Outcome::Notify]);
}

#[test]
fn test_close_and_close_again() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    let log = record_events(&mut tree, &[EventKind::Closed, EventKind::WasClosed]);
    tree.close(&docs);
    drive(&mut tree, &fetch);
    assert_eq!(*log.borrow(), vec!["closed docs"]);
    assert!(!tree.node(&docs).unwrap().open);
    // Children stay materialized on a plain close.
    assert!(tree.contains(&NodeId::new("notes")));

    let results = outcomes();
    tree.close_with(&docs, capture(&results));
    drive(&mut tree, &fetch);
    assert_eq!(*log.borrow(), vec!["closed docs", "was_closed docs"]);
    assert_eq!(*results.borrow(), vec![Outcome::Notify]);
}

#[test]
fn test_root_refuses_to_close() {
    let mut tree = loaded_tree(TreeOptions::new());
    let results = outcomes();
    let root = tree.root_id();

    tree.close_with(&root, capture(&results));
    drive(&mut tree, &fetch);

    assert!(results.borrow()[0].is_fail());
    assert!(tree.node(&root).unwrap().open);
}

#[test]
fn test_toggle_flips_both_ways() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");

    tree.toggle(&docs);
    drive(&mut tree, &fetch);
    assert!(tree.node(&docs).unwrap().open);

    tree.toggle(&docs);
    drive(&mut tree, &fetch);
    assert!(!tree.node(&docs).unwrap().open);
}

#[test]
fn test_confirmed_leaf_refuses_to_open() {
    let mut tree = loaded_tree(TreeOptions::new());
    let results = outcomes();

    tree.open_with(&NodeId::new("readme"), capture(&results));
    drive(&mut tree, &fetch);

    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Validation { .. })
    ));
}

#[test]
fn test_open_refused_when_load_confirms_leaf() {
    let mut tree = loaded_tree(TreeOptions::new());
    let results = outcomes();
    let music = NodeId::new("music");

    // The branch turns out to have nothing in it.
    let empty = |node: Option<&NodeId>| match node.map(NodeId::as_str) {
        Some("music") => Ok(vec![]),
        _ => fetch(node),
    };
    tree.open_with(&music, capture(&results));
    drive(&mut tree, &empty);

    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Validation { .. })
    ));
    let node = tree.node(&music).unwrap();
    assert!(!node.open);
    assert!(node.is_loaded());
    assert_eq!(node.inner, Some(false));
    assert!(!node.busy);
}

#[test]
fn test_expand_flag_opens_children_recursively() {
    let mut tree = loaded_tree(TreeOptions::new());

    tree.open_with(&NodeId::new("docs"), OpOptions::new().expand());
    drive(&mut tree, &fetch);

    assert!(tree.node(&NodeId::new("docs")).unwrap().open);
    assert!(tree.node(&NodeId::new("reports")).unwrap().open);
    assert!(tree.contains(&NodeId::new("q1")));
    // Leaves are left alone.
    assert!(!tree.node(&NodeId::new("q1")).unwrap().open);
}

#[test]
fn test_empty_flag_discards_children_on_close() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    tree.close_with(&docs, OpOptions::new().empty());
    drive(&mut tree, &fetch);

    assert!(!tree.contains(&NodeId::new("notes")));
    assert_eq!(tree.node(&docs).unwrap().load_state, LoadState::Unloaded);
}

// ============================================================================
// Vetoes
// ============================================================================

#[test]
fn test_before_open_veto_leaves_node_untouched() {
    let mut tree = loaded_tree(TreeOptions::new());
    tree.subscribe(EventKind::BeforeOpen, |_| ControlFlow::Break(()));
    let log = record_events(
        &mut tree,
        &[EventKind::BeforeLoad, EventKind::Loaded, EventKind::Opened],
    );
    let results = outcomes();

    tree.open_with(&NodeId::new("docs"), capture(&results));
    drive(&mut tree, &fetch);

    assert!(log.borrow().is_empty());
    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Vetoed { event: EventKind::BeforeOpen, .. })
    ));
    let docs = tree.node(&NodeId::new("docs")).unwrap();
    assert!(!docs.open);
    assert!(!docs.busy);
    assert_eq!(docs.load_state, LoadState::Unloaded);
}

#[test]
fn test_before_load_veto_fails_the_open() {
    let mut tree = loaded_tree(TreeOptions::new());
    tree.subscribe(EventKind::BeforeLoad, |_| ControlFlow::Break(()));
    let results = outcomes();

    tree.open_with(&NodeId::new("docs"), capture(&results));
    drive(&mut tree, &fetch);

    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::Vetoed { event: EventKind::BeforeLoad, .. })
    ));
    let docs = tree.node(&NodeId::new("docs")).unwrap();
    assert!(!docs.busy);
    assert_eq!(docs.load_state, LoadState::Unloaded);
}

#[test]
fn test_node_scoped_subscription_only_sees_its_node() {
    let mut tree = loaded_tree(TreeOptions::new());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    tree.subscribe_node(NodeId::new("music"), EventKind::Opened, move |notice| {
        sink.borrow_mut()
            .push(notice.target.map(NodeId::as_str).unwrap_or("-").to_string());
        ControlFlow::Continue(())
    });

    tree.open(&NodeId::new("docs"));
    drive(&mut tree, &fetch);
    assert!(seen.borrow().is_empty());

    tree.open(&NodeId::new("music"));
    drive(&mut tree, &fetch);
    assert_eq!(*seen.borrow(), vec!["music"]);
}

// ============================================================================
// Busy serialization
// ============================================================================

#[test]
fn test_close_retries_while_open_is_in_flight() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");
    let results = outcomes();

    tree.open(&docs);
    let now = Instant::now();
    // Dispatch the fetch but hold its reply.
    assert!(tree.tick(now));
    let requests = tree.take_load_requests();
    assert_eq!(requests.len(), 1);
    assert!(tree.node(&docs).unwrap().busy);

    // The close finds the node busy and queues a retry instead of failing.
    tree.close_with(&docs, capture(&results));
    assert!(results.borrow().is_empty());

    // Resolve the open, then let the retry run.
    tree.resolve_load(requests[0].ticket, fetch(requests[0].node.as_ref()));
    assert!(tree.node(&docs).unwrap().open);
    drive(&mut tree, &fetch);

    assert_eq!(*results.borrow(), vec![Outcome::Success]);
    assert!(!tree.node(&docs).unwrap().open);
}

#[test]
fn test_busy_timeout_after_retry_budget() {
    let mut tree = loaded_tree(TreeOptions::new().busy_retry_limit(2));
    let docs = NodeId::new("docs");
    let results = outcomes();

    // Never resolve this open; docs stays busy.
    tree.open(&docs);
    tree.close_with(&docs, capture(&results));

    let mut now = Instant::now() + Duration::from_secs(7200);
    for _ in 0..20 {
        if !results.borrow().is_empty() {
            break;
        }
        tree.tick(now);
        now += Duration::from_secs(1);
    }

    assert!(matches!(
        results.borrow()[0].error(),
        Some(TreeError::BusyTimeout(_))
    ));
    // The abandoned open still holds the node.
    assert!(tree.node(&docs).unwrap().busy);
}

#[test]
fn test_busy_retry_delay_follows_ticked_time() {
    let mut tree =
        loaded_tree(TreeOptions::new().busy_retry_delay(Duration::from_secs(10)));
    let docs = NodeId::new("docs");
    let results = outcomes();

    let base = Instant::now() + Duration::from_secs(7200);
    tree.open(&docs);
    assert!(tree.tick(base));
    let parked = tree.take_load_requests();
    tree.close_with(&docs, capture(&results));
    tree.resolve_load(parked[0].ticket, fetch(parked[0].node.as_ref()));

    // The retry deadline is relative to the last dispatch time, not the
    // wall clock when the retry was queued.
    assert!(!tree.tick(base + Duration::from_secs(9)));
    assert!(tree.tick(base + Duration::from_secs(10)));
    assert_eq!(*results.borrow(), vec![Outcome::Success]);
    assert!(!tree.node(&docs).unwrap().open);
}

// ============================================================================
// Unique branch
// ============================================================================

#[test]
fn test_unique_branch_keeps_only_the_target_axis() {
    let mut tree = loaded_tree(TreeOptions::new().unique_branch());

    tree.open(&NodeId::new("docs"));
    drive(&mut tree, &fetch);
    tree.open(&NodeId::new("reports"));
    drive(&mut tree, &fetch);
    // Both lie on one axis; nothing to close yet.
    assert!(tree.node(&NodeId::new("docs")).unwrap().open);
    assert!(tree.node(&NodeId::new("reports")).unwrap().open);

    tree.open(&NodeId::new("music"));
    drive(&mut tree, &fetch);

    assert!(tree.node(&NodeId::new("music")).unwrap().open);
    assert!(!tree.node(&NodeId::new("docs")).unwrap().open);
    assert!(!tree.node(&NodeId::new("reports")).unwrap().open);
}

#[test]
fn test_unique_branch_waits_for_busy_branch_to_close() {
    let mut tree = loaded_tree(TreeOptions::new().unique_branch());
    let docs = NodeId::new("docs");
    tree.open(&docs);
    drive(&mut tree, &fetch);

    // Park a reload so docs holds its busy flag; the fan-out close will
    // sit in the retry loop until it is released.
    tree.reload(&docs);
    let mut now = Instant::now() + Duration::from_secs(7200);
    assert!(tree.tick(now));
    now += Duration::from_secs(1);
    let parked = tree.take_load_requests();
    assert_eq!(parked.len(), 1);
    assert!(tree.node(&docs).unwrap().busy);

    let docs_open_at_success = Rc::new(RefCell::new(None));
    let seen = Rc::clone(&docs_open_at_success);
    tree.open_with(
        &NodeId::new("music"),
        OpOptions::new().on_success(move |tree, _| {
            *seen.borrow_mut() = Some(tree.node(&NodeId::new("docs")).unwrap().open);
        }),
    );
    for _ in 0..4 {
        tree.tick(now);
        now += Duration::from_secs(1);
        for request in tree.take_load_requests() {
            tree.resolve_load(request.ticket, fetch(request.node.as_ref()));
        }
    }
    // The open's success must not fire while docs is still open.
    assert!(docs_open_at_success.borrow().is_none());
    assert!(!tree.node(&NodeId::new("music")).unwrap().open);

    tree.resolve_load(parked[0].ticket, fetch(parked[0].node.as_ref()));
    drive(&mut tree, &fetch);

    assert_eq!(*docs_open_at_success.borrow(), Some(false));
    assert!(tree.node(&NodeId::new("music")).unwrap().open);
    assert!(!tree.node(&docs).unwrap().open);
}

// ============================================================================
// Hidden / disabled
// ============================================================================

#[test]
fn test_hidden_overlay_and_stripe_recompute() {
    let mut tree = loaded_tree(TreeOptions::new());
    let log = record_events(&mut tree, &[EventKind::HiddenChanged]);

    assert!(tree.set_hidden(&NodeId::new("music"), true).is_success());
    assert_eq!(*log.borrow(), vec!["hidden_changed music"]);

    let visible: Vec<NodeId> = tree.visible_nodes();
    let ids: Vec<&str> = visible.iter().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["docs", "readme"]);
    // Parity is computed over the visible run only.
    assert!(!tree.node(&NodeId::new("docs")).unwrap().striped);
    assert!(tree.node(&NodeId::new("readme")).unwrap().striped);

    // Re-hiding a hidden node is a notify, no event.
    assert!(tree.set_hidden(&NodeId::new("music"), true).is_notify());
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn test_before_hide_veto() {
    let mut tree = loaded_tree(TreeOptions::new());
    tree.subscribe(EventKind::BeforeHide, |_| ControlFlow::Break(()));

    let outcome = tree.set_hidden(&NodeId::new("music"), true);

    assert!(outcome.is_fail());
    assert!(!tree.node(&NodeId::new("music")).unwrap().hidden);
}

#[test]
fn test_disabled_is_advisory_only() {
    let mut tree = loaded_tree(TreeOptions::new());
    let docs = NodeId::new("docs");

    assert!(tree.set_disabled(&docs, true).is_success());
    assert!(tree.node(&docs).unwrap().disabled);

    // The engine does not gate operations on it.
    tree.open(&docs);
    drive(&mut tree, &fetch);
    assert!(tree.node(&docs).unwrap().open);
}

// ============================================================================
// Visible traversal
// ============================================================================

#[test]
fn test_visible_order_and_neighbors() {
    let mut tree = loaded_tree(TreeOptions::new());
    tree.open(&NodeId::new("docs"));
    drive(&mut tree, &fetch);

    let visible = tree.visible_nodes();
    let ids: Vec<&str> = visible.iter().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["docs", "reports", "notes", "music", "readme"]);

    assert_eq!(tree.next_visible(&NodeId::new("notes")), Some(NodeId::new("music")));
    assert_eq!(tree.prev_visible(&NodeId::new("docs")), None);
    // Children of closed branches are not visible.
    assert!(tree.contains(&NodeId::new("reports")));
    tree.close(&NodeId::new("docs"));
    drive(&mut tree, &fetch);
    let visible = tree.visible_nodes();
    let ids: Vec<&str> = visible.iter().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["docs", "music", "readme"]);
}
