//! Integration tests for corpus loading, saving and repair

use errata::corpus::{
    load_from_path, load_from_str, repair_file, save_to_string, try_repair, Corpus, CorpusError,
    Entry, ErrataRecorder, ParseError, Position, RepairOptions, RepairResult,
};
use errata::{EditError, Operation};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CHAPTER_REPAIRED: &str = "CHAPTER ONE\n===========\nIt was the best.\nSecond sentence.\nThird sentence.\nStray remark.\nThe end.\n";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn replace(find: &str, replace: &str) -> Operation {
    Operation::Replace {
        find: find.to_string(),
        replace: replace.to_string(),
    }
}

/// Helper to copy the fixture texts into a scratch directory
fn setup_texts() -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in ["chapter1.txt", "notes.txt"] {
        fs::copy(fixture(name), dir.path().join(name)).unwrap();
    }
    dir
}

#[test]
fn test_replace_grows_file() {
    let corpus = load_from_str(
        r#"<errata>
  <file name="a.txt">
    <line number="2"><find>line2</find><replace>LINE2\nEXTRA</replace></line>
  </file>
</errata>"#,
    )
    .unwrap();

    let repair = try_repair(&corpus, "a.txt", "line1\nline2\nline3\n").unwrap();
    assert!(repair.changed);
    assert_eq!(repair.text, "line1\nLINE2\nEXTRA\nline3\n");
    assert_eq!(repair.text.lines().count(), 4);
}

#[test]
fn test_absent_anchor_leaves_text() {
    let corpus = load_from_str(
        r#"<errata>
  <file name="a.txt">
    <line number="2"><find>line9</find><replace>anything</replace></line>
  </file>
</errata>"#,
    )
    .unwrap();

    let repair = try_repair(&corpus, "a.txt", "line1\nline2\nline3\n").unwrap();
    assert!(!repair.changed);
    assert_eq!(repair.text, "line1\nline2\nline3\n");
}

#[test]
fn test_fixture_corpus_repairs_chapter() {
    let corpus = load_from_path(fixture("sample.errata.xml")).unwrap();
    let original = fs::read_to_string(fixture("chapter1.txt")).unwrap();

    let repair = try_repair(&corpus, "chapter1.txt", &original).unwrap();
    assert!(repair.changed);
    assert_eq!(repair.text, CHAPTER_REPAIRED);

    let again = try_repair(&corpus, "chapter1.txt", &repair.text).unwrap();
    assert!(!again.changed);
}

#[test]
fn test_range_replace_stays_inside_window() {
    let corpus = load_from_path(fixture("sample.errata.xml")).unwrap();
    let original = fs::read_to_string(fixture("notes.txt")).unwrap();

    let repair = try_repair(&corpus, "notes.txt", &original).unwrap();
    assert_eq!(
        repair.text,
        "I did receive it.\nWe receive daily.\nrecieve\n"
    );
}

/// Entries see the line numbers left behind by the entries before them.
/// An entry below a growing edit, addressed by its original line number,
/// misses its anchor.
#[test]
fn test_drift_top_to_bottom_misses_later_entry() {
    let text = "a\nb\nc\n";

    let mut corpus = Corpus::default();
    corpus.push("f", Entry::new(Position::line(1), replace("a", "a\\nextra")));
    corpus.push("f", Entry::new(Position::line(3), replace("c", "C")));

    let repair = try_repair(&corpus, "f", text).unwrap();
    // Line 3 now holds "b", so the second entry does nothing
    assert_eq!(repair.text, "a\nextra\nb\nc\n");
}

#[test]
fn test_drift_post_mutation_numbering_applies() {
    let text = "a\nb\nc\n";

    let mut corpus = Corpus::default();
    corpus.push("f", Entry::new(Position::line(1), replace("a", "a\\nextra")));
    corpus.push("f", Entry::new(Position::line(4), replace("c", "C")));

    let repair = try_repair(&corpus, "f", text).unwrap();
    assert_eq!(repair.text, "a\nextra\nb\nC\n");
}

#[test]
fn test_drift_bottom_to_top_authoring_applies() {
    let text = "a\nb\nc\n";

    let mut corpus = Corpus::default();
    corpus.push("f", Entry::new(Position::line(3), replace("c", "C")));
    corpus.push("f", Entry::new(Position::line(1), replace("a", "a\\nextra")));

    let repair = try_repair(&corpus, "f", text).unwrap();
    assert_eq!(repair.text, "a\nextra\nb\nC\n");
}

#[test]
fn test_repeated_repair_converges() {
    let corpus = load_from_path(fixture("sample.errata.xml")).unwrap();
    let mut text = fs::read_to_string(fixture("chapter1.txt")).unwrap();

    let mut passes = 0;
    loop {
        let repair = try_repair(&corpus, "chapter1.txt", &text).unwrap();
        if !repair.changed {
            break;
        }
        text = repair.text;
        passes += 1;
        assert!(passes < 5, "repair did not converge");
    }
    assert_eq!(passes, 1);
}

#[test]
fn test_out_of_bounds_entry_fails_repair() {
    let mut corpus = Corpus::default();
    corpus.push(
        "f",
        Entry::new(
            Position::Range {
                from: Some(2),
                to: Some(9),
            },
            replace("x", "y"),
        ),
    );

    let err = try_repair(&corpus, "f", "x\nx\n").unwrap_err();
    assert!(matches!(err, EditError::InvalidRange { to: 9, .. }));
}

#[test]
fn test_move_out_of_bounds_fails_repair() {
    let corpus = load_from_str(
        r#"<errata>
  <file name="f">
    <line number="1"><find>top</find><up>1</up></line>
  </file>
</errata>"#,
    )
    .unwrap();

    let err = try_repair(&corpus, "f", "top\nbottom\n").unwrap_err();
    assert!(matches!(err, EditError::MoveOutOfBounds { distance: -1, .. }));
}

#[test]
fn test_huge_move_distance_fails_repair() {
    let corpus = load_from_str(
        r#"<errata>
  <file name="f">
    <line number="2"><find>b</find><down>9223372036854775807</down></line>
  </file>
</errata>"#,
    )
    .unwrap();

    let err = try_repair(&corpus, "f", "a\nb\nc\n").unwrap_err();
    assert!(matches!(
        err,
        EditError::MoveOutOfBounds {
            distance: isize::MAX,
            ..
        }
    ));
}

#[test]
fn test_open_range_on_empty_file() {
    let corpus = load_from_str(
        r#"<errata>
  <file name="f">
    <range><find>teh</find><replace>the</replace></range>
  </file>
</errata>"#,
    )
    .unwrap();

    let repair = try_repair(&corpus, "f", "").unwrap();
    assert!(!repair.changed);
    assert_eq!(repair.text, "");
}

#[test]
fn test_fixture_round_trip() {
    let corpus = load_from_path(fixture("sample.errata.xml")).unwrap();
    let xml = save_to_string(&corpus).unwrap();
    let reloaded = load_from_str(&xml).unwrap();

    assert_eq!(reloaded, corpus);
    assert_eq!(
        reloaded.get("chapter1.txt").unwrap().path.as_deref(),
        Some("chapter1.txt")
    );
    assert_eq!(reloaded.entry_count(), 5);
}

#[test]
fn test_load_is_all_or_nothing() {
    let missing_anchor = r#"<errata>
  <file name="a"><line number="1"><replace>x</replace></line></file>
</errata>"#;
    assert!(matches!(
        load_from_str(missing_anchor),
        Err(CorpusError::Parse {
            source: ParseError::MissingAnchor { .. },
            ..
        })
    ));

    let bad_number = r#"<errata>
  <file name="a"><line number="1"><find>x</find><replace>y</replace></line></file>
  <file name="b"><line number="two"><find>x</find><replace>y</replace></line></file>
</errata>"#;
    assert!(matches!(
        load_from_str(bad_number),
        Err(CorpusError::Parse {
            source: ParseError::InvalidLineNumber { .. },
            ..
        })
    ));

    let zero_line = r#"<errata>
  <file name="a"><line number="0"><find>x</find><replace>y</replace></line></file>
</errata>"#;
    assert!(matches!(
        load_from_str(zero_line),
        Err(CorpusError::Validation { .. })
    ));
}

#[test]
fn test_repair_file_with_backup() {
    let dir = setup_texts();
    let path = dir.path().join("chapter1.txt");
    let corpus = load_from_path(fixture("sample.errata.xml")).unwrap();
    let options = RepairOptions {
        dry_run: false,
        backup_suffix: Some(".bak".to_string()),
    };

    let result = repair_file(&corpus, &path, "chapter1.txt", &options).unwrap();
    assert!(matches!(result, RepairResult::Repaired { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), CHAPTER_REPAIRED);
    assert_eq!(
        fs::read_to_string(dir.path().join("chapter1.txt.bak")).unwrap(),
        fs::read_to_string(fixture("chapter1.txt")).unwrap()
    );

    let again = repair_file(&corpus, &path, "chapter1.txt", &options).unwrap();
    assert!(matches!(again, RepairResult::Unchanged { .. }));
}

#[test]
fn test_recorded_corrections_replay() {
    let dir = setup_texts();
    let corpus_path = dir.path().join("errata.xml");

    let mut recorder = ErrataRecorder::new();
    recorder.record("notes.txt", 3, "recieve\n", "receive\n", Some("last line"));
    recorder.record("notes.txt", 1, "I did", "I did not", None);
    assert_eq!(recorder.flush_to_path(&corpus_path).unwrap(), 2);

    let corpus = load_from_path(&corpus_path).unwrap();
    let original = fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    let repair = try_repair(&corpus, "notes.txt", &original).unwrap();
    assert_eq!(
        repair.text,
        "I did not recieve it.\nWe recieve daily.\nreceive\n"
    );
}

#[test]
fn test_recorded_blank_line_removal_replays() {
    let mut recorder = ErrataRecorder::new();
    recorder.record("f", 1, "a\n\n", "a\n", None);
    let mut corpus = Corpus::default();
    recorder.flush_into(&mut corpus);

    let repair = try_repair(&corpus, "f", "a\n\nb\n").unwrap();
    assert!(repair.changed);
    assert_eq!(repair.text, "a\nb\n");
}
