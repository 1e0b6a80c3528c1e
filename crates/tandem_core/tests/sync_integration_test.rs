//! Integration tests for editor <-> shared text synchronization.

use std::sync::{Arc, Mutex};

use futures_lite::future::block_on;
use tandem_core::config::SyncConfig;
use tandem_core::editor::{BoxFuture, Editor};
use tandem_core::sync::SyncEngine;
use tandem_core::tracker::ChangeTracker;
use tandem_core::types::TextChange;
use yrs::{Doc, Text, Transact};

/// Minimal in-memory editor buffer for driving an engine end to end.
struct BufferEditor {
    buffer: Mutex<String>,
}

impl BufferEditor {
    fn new(initial: &str) -> Arc<Self> {
        Arc::new(Self {
            buffer: Mutex::new(initial.to_string()),
        })
    }
}

impl Editor for BufferEditor {
    fn text(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }

    fn apply_edit<'a>(&'a self, edits: &'a [TextChange]) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let mut buffer = self.buffer.lock().unwrap();
            match ChangeTracker::apply_text_changes(&buffer, edits) {
                Ok(updated) => {
                    *buffer = updated;
                    true
                }
                Err(_) => false,
            }
        })
    }
}

struct Peer {
    engine: Arc<SyncEngine<BufferEditor>>,
    editor: Arc<BufferEditor>,
}

fn make_peer(initial: &str, editor_text: &str) -> Peer {
    let doc = Doc::new();
    let text_ref = doc.get_or_insert_text("body");
    if !initial.is_empty() {
        let mut txn = doc.transact_mut();
        text_ref.insert(&mut txn, 0, initial);
    }
    let editor = BufferEditor::new(editor_text);
    let engine = SyncEngine::bind(&doc, "body", Arc::clone(&editor), SyncConfig::default())
        .expect("bind failed");
    Peer { engine, editor }
}

/// Exchange diffs until both peers stop producing new state.
fn sync_peers(a: &Peer, b: &Peer) {
    for _ in 0..10 {
        let diff_ab = a
            .engine
            .encode_diff(&b.engine.encode_state_vector().unwrap())
            .unwrap();
        if !diff_ab.is_empty() {
            block_on(b.engine.apply_remote_update(&diff_ab)).unwrap();
        }

        let diff_ba = b
            .engine
            .encode_diff(&a.engine.encode_state_vector().unwrap())
            .unwrap();
        if !diff_ba.is_empty() {
            block_on(a.engine.apply_remote_update(&diff_ba)).unwrap();
        }

        if a.engine.encode_state_vector().unwrap() == b.engine.encode_state_vector().unwrap() {
            break;
        }
    }
}

#[test]
fn test_edit_propagates_between_editors() {
    let a = make_peer("# Shared note\n", "# Shared note\n");
    let b = make_peer("", "");

    sync_peers(&a, &b);
    assert_eq!(b.editor.text(), "# Shared note\n");

    // A types at the end of the heading.
    block_on(
        a.engine
            .handle_editor_change(vec![TextChange::insert(13, "!")]),
    )
    .unwrap();
    sync_peers(&a, &b);

    assert_eq!(a.editor.text(), "# Shared note\n");
    assert_eq!(b.editor.text(), "# Shared note!\n");
    assert_eq!(b.engine.doc().crdt_string(), "# Shared note!\n");
}

#[test]
fn test_concurrent_edits_converge() {
    let a = make_peer("base\n", "base\n");
    let b = make_peer("", "");
    sync_peers(&a, &b);

    // Both sides edit before either hears from the other.
    block_on(
        a.engine
            .handle_editor_change(vec![TextChange::insert(0, "A: ")]),
    )
    .unwrap();
    block_on(
        b.engine
            .handle_editor_change(vec![TextChange::insert(5, "B")]),
    )
    .unwrap();

    sync_peers(&a, &b);

    let a_text = a.engine.doc().crdt_string();
    assert_eq!(a_text, b.engine.doc().crdt_string());
    assert!(a_text.contains("A: "));
    assert!(a_text.contains('B'));

    // The editors converged with the shared text, so later reconciliation
    // finds nothing to do.
    assert_eq!(a.editor.text(), a_text);
    assert_eq!(b.editor.text(), a_text);
}

#[test]
fn test_crlf_editor_stays_in_style() {
    let a = make_peer("one\ntwo\n", "one\ntwo\n");
    let b = make_peer("one\ntwo\n", "one\r\ntwo\r\n");

    // A appends a third line; B receives it with CRLF endings.
    block_on(
        a.engine
            .handle_editor_change(vec![TextChange::insert(8, "three\n")]),
    )
    .unwrap();
    sync_peers(&a, &b);

    assert_eq!(b.editor.text(), "one\r\ntwo\r\nthree\r\n");
    assert_eq!(b.engine.doc().crdt_string(), "one\ntwo\nthree\n");

    // B replies in its native style; the shared text stays LF-only.
    block_on(
        b.engine
            .handle_editor_change(vec![TextChange::insert(17, "four\r\n")]),
    )
    .unwrap();
    sync_peers(&a, &b);

    assert_eq!(a.editor.text(), "one\ntwo\nthree\nfour\n");
    assert_eq!(a.engine.doc().crdt_string(), "one\ntwo\nthree\nfour\n");
}

#[test]
fn test_echoed_change_does_not_loop() {
    let a = make_peer("hello\nworld", "hello\nworld");
    let b = make_peer("", "");
    sync_peers(&a, &b);

    block_on(
        a.engine
            .handle_editor_change(vec![TextChange::insert(5, "X")]),
    )
    .unwrap();
    sync_peers(&a, &b);
    assert_eq!(b.editor.text(), "helloX\nworld");

    // B's editor re-emits the change the engine just applied to it. The
    // tracker recognizes it and nothing new is produced.
    let sv = b.engine.encode_state_vector().unwrap();
    block_on(
        b.engine
            .handle_editor_change(vec![TextChange::insert(5, "X")]),
    )
    .unwrap();
    assert_eq!(b.engine.encode_state_vector().unwrap(), sv);
    assert_eq!(b.engine.doc().crdt_string(), "helloX\nworld");
}

#[test]
fn test_unbound_peer_keeps_working_after_dispose() {
    let a = make_peer("shared", "shared");
    let b = make_peer("", "");
    sync_peers(&a, &b);

    b.engine.dispose();
    assert!(b.engine.is_disposed());

    // A continues editing without the departed peer.
    block_on(
        a.engine
            .handle_editor_change(vec![TextChange::insert(6, "!")]),
    )
    .unwrap();
    assert_eq!(a.engine.doc().crdt_string(), "shared!");
}
