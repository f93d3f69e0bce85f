//! End-to-end batches through the tick engine, checked against the exact
//! snapshots, statuses, and version numbers they must produce.

use std::time::Duration;

use tickdown::broadcast::{apply_block, parse_block, render_block};
use tickdown::command::{CmdStatus, Command, Role, Timestamp};
use tickdown::engine::run_tick;
use tickdown::{ChunkKind, Document, QueuedCommand};

fn queued(raw: &str, usec: u64) -> QueuedCommand {
    QueuedCommand::new("alice", Role::Write, Timestamp::from_micros(usec), raw)
}

fn queued_cmd(cmd: Command, raw: &str) -> QueuedCommand {
    QueuedCommand {
        username: "alice".into(),
        role: Role::Write,
        at: Duration::from_micros(0),
        raw: raw.to_string(),
        parsed: Ok(cmd),
    }
}

/// Run one tick over raw command lines, submitted in order with rising
/// timestamps.
fn tick(doc: &mut Document, raws: &[&str]) -> Vec<CmdStatus> {
    let batch = raws.iter().enumerate().map(|(i, r)| queued(r, i as u64)).collect();
    let report = run_tick(doc, batch);
    doc.dbg_check();
    report.edits.into_iter().map(|e| e.status).collect()
}

fn snap(doc: &Document) -> String {
    String::from_utf8_lossy(doc.snapshot()).into_owned()
}

#[test]
fn insert_heading_bold_in_three_ticks() {
    let mut doc = Document::new();

    // The insert carries its own newline; only the engine API can do that,
    // the line grammar never will.
    let report = run_tick(
        &mut doc,
        vec![queued_cmd(Command::Insert { pos: 0, text: "Hello\n".into() }, "INSERT 0 Hello")],
    );
    assert_eq!(snap(&doc), "Hello\n");
    assert_eq!(report.version, 1);
    doc.dbg_check();

    tick(&mut doc, &["HEADING 1 0"]);
    assert_eq!(snap(&doc), "# Hello\n");
    assert_eq!(doc.version(), 2);

    tick(&mut doc, &["BOLD 2 7"]);
    assert_eq!(snap(&doc), "# **Hello**\n");
    assert_eq!(doc.version(), 3);
}

#[test]
fn mixed_batch_against_an_empty_snapshot() {
    let mut doc = Document::new();
    // All three commands reference the empty pre-tick snapshot: the delete
    // has nothing to aim at, but the bold wraps the freshly inserted text.
    let statuses = tick(&mut doc, &["INSERT 0 abcdef", "DEL 1 2", "BOLD 0 3"]);
    assert_eq!(
        statuses,
        vec![CmdStatus::Success, CmdStatus::InvalidPosition, CmdStatus::Success]
    );
    assert_eq!(snap(&doc), "**abcdef**");
    assert_eq!(doc.version(), 1);
}

#[test]
fn concurrent_insert_and_delete() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 abc"]);

    // Two clients, same tick. The delete is submitted later but still cuts
    // the snapshot bytes first; the insert then lands at the hole's start.
    let batch = vec![
        QueuedCommand::new("alice", Role::Write, Timestamp::from_micros(1), "INSERT 0 xyz"),
        QueuedCommand::new("bob", Role::Write, Timestamp::from_micros(2), "DEL 0 2"),
    ];
    let report = run_tick(&mut doc, batch);
    assert!(report.edits.iter().all(|e| e.status == CmdStatus::Success));
    assert_eq!(snap(&doc), "xyzc");
    doc.dbg_check();
}

#[test]
fn ordered_list_run_caps_at_nine() {
    let mut doc = Document::new();
    let statuses = tick(&mut doc, &["ORDERED_LIST 0"; 10]);
    assert!(statuses.iter().all(|s| *s == CmdStatus::Success));

    assert_eq!(doc.num_chunks(), 10);
    let indices: Vec<u8> = doc.chunks().map(|c| c.ol_index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 9]);
    assert_eq!(
        snap(&doc),
        "1. \n2. \n3. \n4. \n5. \n6. \n7. \n8. \n9. \n9. "
    );
}

#[test]
fn ordered_run_renumbers_rising_after_a_deleted_item() {
    let mut doc = Document::new();
    tick(&mut doc, &["ORDERED_LIST 0"; 4]);
    // Drop the second item ("2. \n"); the survivors renumber 1, 2, 3.
    tick(&mut doc, &["DEL 4 4"]);
    assert_eq!(snap(&doc), "1. \n2. \n3. ");
    let indices: Vec<u8> = doc.chunks().map(|c| c.ol_index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
}

#[test]
fn heading_at_the_unterminated_end() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 abc"]);
    let statuses = tick(&mut doc, &["HEADING 1 3"]);
    assert_eq!(statuses, vec![CmdStatus::Success]);
    assert_eq!(snap(&doc), "abc\n# ");
}

#[test]
fn horizontal_rule_mid_line() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 hello"]);
    tick(&mut doc, &["HORIZONTAL_RULE 2"]);
    assert_eq!(snap(&doc), "he\n---\nllo");
    let kinds: Vec<ChunkKind> = doc.chunks().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![ChunkKind::Plain, ChunkKind::HorizontalRule, ChunkKind::Plain]
    );
}

#[test]
fn insert_then_delete_of_matching_text_restores_the_snapshot() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 hello"]);
    let before = snap(&doc);

    let statuses = tick(&mut doc, &["INSERT 0 hello", "DEL 0 5"]);
    assert!(statuses.iter().all(|s| *s == CmdStatus::Success));
    assert_eq!(snap(&doc), before);
}

#[test]
fn link_and_inline_delimiters() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 hello world"]);
    tick(&mut doc, &["LINK 0 5 http://example.com/x"]);
    assert_eq!(snap(&doc), "[hello](http://example.com/x) world");

    tick(&mut doc, &["CODE 30 35"]);
    assert_eq!(snap(&doc), "[hello](http://example.com/x) `world`");

    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 abc"]);
    tick(&mut doc, &["ITALIC 0 3"]);
    assert_eq!(snap(&doc), "*abc*");
}

#[test]
fn double_bold_keeps_submission_order() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 hello"]);
    tick(&mut doc, &["BOLD 1 3", "BOLD 1 3"]);
    assert_eq!(snap(&doc), "h****el****lo");
}

#[test]
fn version_only_moves_when_something_succeeds() {
    let mut doc = Document::new();
    tick(&mut doc, &["INSERT 0 abc"]);
    assert_eq!(doc.version(), 1);

    // A tick of failures leaves the version alone.
    tick(&mut doc, &["DEL 99 1", "BOLD 2 2", "HEADING 7 0"]);
    assert_eq!(doc.version(), 1);

    // Heartbeats do too.
    let report = run_tick(&mut doc, vec![]);
    assert_eq!(report.version, 1);
    assert_eq!(doc.version(), 1);

    tick(&mut doc, &["NEWLINE 3"]);
    assert_eq!(doc.version(), 2);
}

#[test]
fn read_role_shows_up_rejected_in_the_report() {
    let mut doc = Document::new();
    let batch = vec![
        QueuedCommand::new("writer", Role::Write, Timestamp::from_micros(0), "INSERT 0 hi"),
        QueuedCommand::new("reader", Role::Read, Timestamp::from_micros(1), "INSERT 0 no"),
    ];
    let report = run_tick(&mut doc, batch);
    assert_eq!(report.edits[0].status, CmdStatus::Success);
    assert_eq!(report.edits[1].status, CmdStatus::Unauthorised);
    assert_eq!(report.edits[1].username, "reader");
    assert_eq!(snap(&doc), "hi");
}

#[test]
fn replica_tracks_the_server_through_broadcasts() {
    let mut server = Document::new();
    let mut replica = Document::new();

    let ticks: Vec<Vec<QueuedCommand>> = vec![
        vec![queued("INSERT 0 hello world", 0)],
        vec![
            queued("HEADING 1 0", 0),
            QueuedCommand::new("eve", Role::Read, Timestamp::from_micros(1), "DEL 0 5"),
        ],
        vec![queued("BOLD 2 7", 0), queued("DEL 90 2", 1)],
        vec![queued("ORDERED_LIST 13", 0), queued("GARBAGE 1", 1)],
        vec![],
        vec![queued("DEL 2 4", 0), queued("INSERT 4 mid", 1)],
    ];

    for batch in ticks {
        let report = run_tick(&mut server, batch);
        let block = render_block(&report);

        let parsed = parse_block(&block).expect("server blocks always parse");
        assert_eq!(parsed.version, report.version);
        apply_block(&mut replica, &parsed).expect("successful edits always re-apply");

        assert_eq!(replica.snapshot(), server.snapshot());
        assert_eq!(replica.version(), server.version());
        server.dbg_check();
        replica.dbg_check();
    }
}

#[test]
fn replica_bootstraps_from_a_parsed_snapshot() {
    let mut server = Document::new();
    tick(&mut server, &["INSERT 0 one"]);
    tick(&mut server, &["NEWLINE 3"]);
    tick(&mut server, &["ORDERED_LIST 0", "ORDERED_LIST 4"]);

    // A client joining now parses the flattened snapshot, then follows
    // broadcasts like everyone else.
    let mut replica = Document::parse_markdown(server.snapshot());
    assert_eq!(replica.flatten(), server.snapshot());
    replica.dbg_check();

    let report = run_tick(&mut server, vec![queued("BOLD 3 6", 0)]);
    let block = render_block(&report);
    apply_block(&mut replica, &parse_block(&block).unwrap()).unwrap();
    assert_eq!(replica.snapshot(), server.snapshot());
}
