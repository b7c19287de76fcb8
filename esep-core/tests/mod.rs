use esep_core::config::SessionConfig;
use esep_core::event_log::LOG_HEADER;
use esep_core::{
    CaptureCommand, Command, ConfigError, EventLog, Line, Phase, Position, RecordingConfig,
    RecordingError, RecordingSupervisor, Script, ScriptError, Session, SessionOptions,
    SessionState, load_script, parse_script,
};
use esep_io::testing::MockActuator;
use esep_io::{Action, Actuator, DispatchError, Dispatcher, Shortcut, ShortcutVocabulary};

use async_trait::async_trait;
use chrono::TimeZone;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

const HEADER: &str = "Phase;Phase description;Line;Script;Motion\n";

fn script_from(rows: &str) -> Script {
    parse_script(format!("{}{}", HEADER, rows).as_bytes(), b';').unwrap()
}

/// Three phases, one line each.
fn abc_script() -> Script {
    script_from("1;Intro;1;A;\n2;Middle;1;B;\n3;Outro;1;C;\n")
}

fn two_by_two() -> Script {
    script_from("1;Warmup;1;Hello;\n1;Warmup;2;How are you?;\n2;Task;1;Look left;3\n2;Task;2;;5\n")
}

struct Harness {
    _dir: TempDir,
    log_path: PathBuf,
    mock: MockActuator,
    session: Session<MockActuator>,
}

fn harness(script: Script, options: SessionOptions) -> Harness {
    harness_with(script, options, MockActuator::new())
}

fn harness_with(script: Script, options: SessionOptions, mock: MockActuator) -> Harness {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("experiment_log.csv");
    let log = EventLog::create(&log_path).unwrap();
    let dispatcher = Dispatcher::new(mock.clone(), ShortcutVocabulary::default());
    Harness {
        _dir: dir,
        log_path,
        mock,
        session: Session::new(script, dispatcher, log, options),
    }
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
        .collect()
}

fn speech(text: &str) -> Action {
    Action::Speak(text.to_string())
}

// ============================================================================
// Script Parsing Tests
// ============================================================================

#[test]
fn test_parse_orders_phases_and_lines() {
    let script = script_from("2;Second;2;d;\n1;First;2;b;\n2;Second;1;c;\n1;First;1;a;\n");
    assert_eq!(script.phase_numbers(), vec![1, 2]);
    let texts: Vec<&str> = script
        .phases()
        .iter()
        .flat_map(|p| p.lines.iter().map(|l| l.text.as_str()))
        .collect();
    assert_eq!(texts, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_parse_reads_description_and_motion() {
    let script = two_by_two();
    let phase = &script.phases()[1];
    assert_eq!(phase.description, "Task");
    assert_eq!(phase.lines[0], Line::new(1, "Look left", Some(3)));
    assert_eq!(phase.lines[1], Line::new(2, "", Some(5)));
    assert_eq!(script.phases()[0].lines[0].motion, None);
}

#[test]
fn test_parse_tolerates_bom_and_padded_headers() {
    let text = "\u{feff}Phase ; Phase description ;Line;Script; Motion\n1;Intro;1;Hi;\n";
    let script = parse_script(text.as_bytes(), b';').unwrap();
    assert_eq!(script.total_lines(), 1);
}

#[test]
fn test_parse_tolerates_extra_columns_in_any_order() {
    let text = "Notes;Motion;Script;Line;Phase description;Phase\nx;2;Hi;1;Intro;1\n";
    let script = parse_script(text.as_bytes(), b';').unwrap();
    assert_eq!(script.phases()[0].lines[0], Line::new(1, "Hi", Some(2)));
}

#[test]
fn test_parse_with_comma_delimiter() {
    let text = "Phase,Phase description,Line,Script,Motion\n1,Intro,1,\"Hello, there\",\n";
    let script = parse_script(text.as_bytes(), b',').unwrap();
    assert_eq!(script.phases()[0].lines[0].text, "Hello, there");
}

#[test]
fn test_parse_skips_blank_rows() {
    let script = script_from("1;Intro;1;Hi;\n;;;;\n2;Next;1;Bye;\n");
    assert_eq!(script.total_lines(), 2);
}

#[test]
fn test_parse_missing_motion_column() {
    let text = "Phase;Phase description;Line;Script\n1;Intro;1;Hi\n";
    match parse_script(text.as_bytes(), b';') {
        Err(ScriptError::MissingColumns(cols)) => assert_eq!(cols, vec!["Motion".to_string()]),
        other => panic!("Expected MissingColumns, got {:?}", other),
    }
}

#[test]
fn test_parse_lists_every_missing_column() {
    let text = "Phase;Script\n1;Hi\n";
    match parse_script(text.as_bytes(), b';') {
        Err(ScriptError::MissingColumns(cols)) => {
            assert_eq!(cols, vec!["Phase description", "Line", "Motion"]);
        }
        other => panic!("Expected MissingColumns, got {:?}", other),
    }
}

#[test]
fn test_parse_rejects_non_integer_phase() {
    let err = parse_script(format!("{}one;Intro;1;Hi;\n", HEADER).as_bytes(), b';').unwrap_err();
    match err {
        ScriptError::InvalidNumber { row, column, value } => {
            assert_eq!(row, 2);
            assert_eq!(column, "Phase");
            assert_eq!(value, "one");
        }
        other => panic!("Expected InvalidNumber, got {:?}", other),
    }
}

#[test]
fn test_parse_rejects_non_integer_line() {
    let err = parse_script(format!("{}1;Intro;1.5;Hi;\n", HEADER).as_bytes(), b';').unwrap_err();
    assert!(matches!(err, ScriptError::InvalidNumber { column: "Line", .. }));
}

#[test]
fn test_parse_rejects_duplicate_line_numbers() {
    let err = parse_script(format!("{}1;Intro;1;Hi;\n1;Intro;1;Again;\n", HEADER).as_bytes(), b';')
        .unwrap_err();
    assert!(matches!(err, ScriptError::DuplicateLine { phase: 1, line: 1 }));
}

#[test]
fn test_parse_header_only_is_empty() {
    let err = parse_script(HEADER.as_bytes(), b';').unwrap_err();
    assert!(matches!(err, ScriptError::Empty));
}

#[test]
fn test_script_new_rejects_phase_without_lines() {
    let err = Script::new(vec![Phase::new(1, "Empty", vec![])]).unwrap_err();
    assert!(matches!(err, ScriptError::Empty));
}

#[test]
fn test_load_script_missing_file() {
    let err = load_script("/definitely/not/here/esep.csv", b';').unwrap_err();
    assert!(matches!(err, ScriptError::Io { .. }));
}

#[test]
fn test_load_script_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("esep.csv");
    std::fs::write(&path, format!("{}1;Intro;1;Hello;2\n", HEADER)).unwrap();
    let script = load_script(&path, b';').unwrap();
    assert_eq!(script.phases()[0].lines[0], Line::new(1, "Hello", Some(2)));
}

#[test]
fn test_script_error_messages() {
    let err = ScriptError::MissingColumns(vec!["Line".into(), "Motion".into()]);
    assert_eq!(
        err.to_string(),
        "script is missing required column(s): Line, Motion"
    );
}

// ============================================================================
// Navigation Tests
// ============================================================================

#[test]
fn test_next_position_crosses_phases() {
    let script = two_by_two();
    assert_eq!(script.next_position(Position::new(0, 0)), Some(Position::new(0, 1)));
    assert_eq!(script.next_position(Position::new(0, 1)), Some(Position::new(1, 0)));
    assert_eq!(script.next_position(Position::new(1, 1)), None);
}

#[test]
fn test_prev_position_crosses_phases() {
    let script = two_by_two();
    assert_eq!(script.prev_position(Position::new(1, 0)), Some(Position::new(0, 1)));
    assert_eq!(script.prev_position(Position::new(0, 1)), Some(Position::new(0, 0)));
    assert_eq!(script.prev_position(Position::START), None);
}

#[test]
fn test_get_out_of_bounds() {
    let script = abc_script();
    assert!(script.get(Position::new(3, 0)).is_none());
    assert!(script.get(Position::new(0, 1)).is_none());
}

// ============================================================================
// EventLog Tests
// ============================================================================

#[test]
fn test_event_log_writes_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    let log = EventLog::create(&path).unwrap();
    log.close().unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows, vec![LOG_HEADER.iter().map(|s| s.to_string()).collect::<Vec<_>>()]);
}

#[test]
fn test_event_log_rows_are_flushed_immediately() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    let mut log = EventLog::create(&path).unwrap();

    log.record(1, 2, "Hello").unwrap();

    // Readable before close.
    let rows = read_rows(&path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1..], ["1", "2", "Hello"]);
    assert_eq!(log.rows(), 1);
}

#[test]
fn test_event_log_two_decimal_elapsed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    let mut log = EventLog::create(&path).unwrap();
    log.record(1, 1, "x").unwrap();

    let rows = read_rows(&path);
    let stamp = &rows[1][0];
    let (_, decimals) = stamp.split_once('.').unwrap();
    assert_eq!(decimals.len(), 2, "stamp {:?}", stamp);
}

#[test]
fn test_event_log_quotes_commas_and_quotes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    let mut log = EventLog::create(&path).unwrap();
    log.record(1, 1, "Well, \"hello\"").unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows[1][3], "Well, \"hello\"");
}

#[test]
fn test_event_log_elapsed_is_non_decreasing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    let mut log = EventLog::create(&path).unwrap();

    let mut stamps = Vec::new();
    for i in 0..50 {
        stamps.push(log.record(1, i, "tick").unwrap());
        if i % 10 == 0 {
            std::thread::sleep(Duration::from_millis(15));
        }
    }
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    let written: Vec<f64> = read_rows(&path)[1..]
        .iter()
        .map(|r| r[0].parse().unwrap())
        .collect();
    assert!(written.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_event_log_truncates_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    std::fs::write(&path, "old,stuff\n1,2\n3,4\n").unwrap();

    let log = EventLog::create(&path).unwrap();
    log.close().unwrap();

    assert_eq!(read_rows(&path).len(), 1);
}

#[test]
fn test_event_log_creates_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("logs").join("log.csv");
    let log = EventLog::create(&path).unwrap();
    assert_eq!(log.close().unwrap(), path);
    assert!(path.exists());
}

#[test]
fn test_event_log_unwritable_location_is_an_error() {
    let dir = TempDir::new().unwrap();
    // A directory cannot be opened as the log file.
    let err = EventLog::create(dir.path()).unwrap_err();
    assert!(err.to_string().contains("event log"));
}

// ============================================================================
// Session Tests - Walkthrough
// ============================================================================

#[tokio::test]
async fn test_advance_through_script_then_quit() {
    let mut h = harness(abc_script(), SessionOptions::default());

    h.session.begin().await.unwrap();
    let (phase, line) = h.session.current().unwrap();
    assert_eq!((phase.number, line.number, line.text.as_str()), (1, 1, "A"));

    h.session.handle(Command::Advance).await.unwrap();
    let step = h.session.handle(Command::Advance).await.unwrap();
    assert!(step.moved);
    assert_eq!(h.session.current_phase().unwrap().number, 3);
    assert_eq!(h.session.current_line().unwrap().text, "C");

    let step = h.session.handle(Command::Quit).await.unwrap();
    assert!(step.is_finished());
    let path = h.session.close().unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 4);
    let first: f64 = rows[1][0].parse().unwrap();
    assert!(first < 0.5, "first row should be ~0.00, got {}", first);
    assert_eq!(rows[1][1..], ["1", "1", "A"]);
    assert_eq!(rows[2][1..], ["2", "1", "B"]);
    assert_eq!(rows[3][1..], ["3", "1", "C"]);
    assert_eq!(h.mock.sent(), vec![speech("A"), speech("B"), speech("C")]);
}

#[tokio::test]
async fn test_yes_shortcut_keeps_position() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();
    let before = h.session.position();

    let step = h
        .session
        .handle(Command::Shortcut(Shortcut::Yes))
        .await
        .unwrap();

    assert!(!step.moved);
    assert_eq!(step.rows, 1);
    assert_eq!(h.session.position(), before);

    let rows = read_rows(&h.log_path);
    assert_eq!(rows.last().unwrap()[1..], ["2", "1", "[Shortcut] yes"]);
    assert_eq!(
        h.mock.sent()[2..],
        [Action::Trigger(0), speech("yes")]
    );
}

// ============================================================================
// Session Tests - Navigation
// ============================================================================

#[tokio::test]
async fn test_advance_past_end_finishes_without_dispatch() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();
    h.mock.clear();

    let step = h.session.handle(Command::Advance).await.unwrap();

    assert!(step.is_finished());
    assert!(!step.moved);
    assert_eq!(h.session.state(), SessionState::Finished);
    assert!(h.mock.sent().is_empty());
    assert_eq!(h.session.log_rows(), 3);
}

#[tokio::test]
async fn test_commands_after_finish_are_ignored() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Quit).await.unwrap();
    h.mock.clear();

    for cmd in [
        Command::Advance,
        Command::Retreat,
        Command::Shortcut(Shortcut::No),
        Command::Custom("hello".into()),
    ] {
        let step = h.session.handle(cmd).await.unwrap();
        assert!(step.is_finished());
    }
    assert!(h.mock.sent().is_empty());
    assert_eq!(h.session.log_rows(), 1);
}

#[tokio::test]
async fn test_retreat_at_start_is_a_noop() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.mock.clear();

    let step = h.session.handle(Command::Retreat).await.unwrap();

    assert!(!step.moved);
    assert_eq!(h.session.position(), Position::START);
    assert!(h.mock.sent().is_empty());
    assert_eq!(h.session.log_rows(), 1);
}

#[tokio::test]
async fn test_retreat_replays_previous_line() {
    let mut h = harness(two_by_two(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();
    h.mock.clear();

    let step = h.session.handle(Command::Retreat).await.unwrap();

    assert!(step.moved);
    assert_eq!(h.session.position(), Position::new(0, 1));
    assert_eq!(h.mock.sent(), vec![speech("How are you?")]);
}

#[tokio::test]
async fn test_line_with_motion_logs_motion_then_speech() {
    let mut h = harness(two_by_two(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();

    let step = h.session.handle(Command::Advance).await.unwrap();

    assert_eq!(step.rows, 2);
    assert_eq!(
        h.mock.sent()[2..],
        [Action::Trigger(3), speech("Look left")]
    );
    let rows = read_rows(&h.log_path);
    let n = rows.len();
    assert_eq!(rows[n - 2][1..], ["2", "1", "[Motion] 3"]);
    assert_eq!(rows[n - 1][1..], ["2", "1", "Look left"]);
}

#[tokio::test]
async fn test_empty_text_line_dispatches_motion_only() {
    let mut h = harness(two_by_two(), SessionOptions::default());
    h.session.begin().await.unwrap();
    for _ in 0..3 {
        h.session.handle(Command::Advance).await.unwrap();
    }
    assert_eq!(h.session.position(), Position::new(1, 1));

    let sent = h.mock.sent();
    assert_eq!(sent.last(), Some(&Action::Trigger(5)));
    let rows = read_rows(&h.log_path);
    assert_eq!(rows.last().unwrap()[3], "[Motion] 5");
}

#[tokio::test]
async fn test_redraw_changes_nothing() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.mock.clear();

    let step = h.session.handle(Command::Redraw).await.unwrap();

    assert_eq!(step.state, SessionState::Running);
    assert!(!step.moved);
    assert_eq!(step.rows, 0);
    assert!(h.mock.sent().is_empty());
}

// ============================================================================
// Session Tests - Shortcuts
// ============================================================================

#[tokio::test]
async fn test_repeat_uses_current_line() {
    let mut h = harness(two_by_two(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();

    h.session
        .handle(Command::Shortcut(Shortcut::Repeat))
        .await
        .unwrap();

    assert_eq!(h.mock.sent().last(), Some(&speech("I repeat: How are you?")));
    let rows = read_rows(&h.log_path);
    assert_eq!(rows.last().unwrap()[1..], ["1", "2", "[Shortcut] I repeat: How are you?"]);
}

#[tokio::test]
async fn test_retry_and_no_shortcuts() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();

    h.session.handle(Command::Shortcut(Shortcut::Retry)).await.unwrap();
    h.session.handle(Command::Shortcut(Shortcut::No)).await.unwrap();

    let texts: Vec<String> = read_rows(&h.log_path)[2..].iter().map(|r| r[3].clone()).collect();
    assert_eq!(texts, vec!["[Shortcut] please try again", "[Shortcut] no"]);
    assert_eq!(h.session.position(), Position::START);
}

#[tokio::test]
async fn test_custom_message_is_sent_verbatim() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();

    let step = h
        .session
        .handle(Command::Custom("Let's take a break".into()))
        .await
        .unwrap();

    assert_eq!(step.rows, 1);
    assert_eq!(h.mock.sent().last(), Some(&speech("Let's take a break")));
    assert_eq!(
        read_rows(&h.log_path).last().unwrap()[3],
        "[Custom] Let's take a break"
    );
}

#[tokio::test]
async fn test_blank_custom_message_is_ignored() {
    let mut h = harness(abc_script(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.mock.clear();

    let step = h.session.handle(Command::Custom("   ".into())).await.unwrap();
    h.session
        .handle(Command::Shortcut(Shortcut::Custom))
        .await
        .unwrap();

    assert_eq!(step.rows, 0);
    assert!(h.mock.sent().is_empty());
    assert_eq!(h.session.log_rows(), 1);
}

#[tokio::test]
async fn test_shortcut_advances_option() {
    let options = SessionOptions {
        shortcut_advances: true,
    };
    let mut h = harness(abc_script(), options);
    h.session.begin().await.unwrap();

    let step = h
        .session
        .handle(Command::Shortcut(Shortcut::Yes))
        .await
        .unwrap();

    assert!(step.moved);
    assert_eq!(h.session.position(), Position::new(1, 0));
    let texts: Vec<String> = read_rows(&h.log_path)[1..].iter().map(|r| r[3].clone()).collect();
    assert_eq!(texts, vec!["A", "[Shortcut] yes", "B"]);
}

#[tokio::test]
async fn test_custom_message_never_advances() {
    let options = SessionOptions {
        shortcut_advances: true,
    };
    let mut h = harness(abc_script(), options);
    h.session.begin().await.unwrap();

    h.session.handle(Command::Custom("hi".into())).await.unwrap();

    assert_eq!(h.session.position(), Position::START);
}

// ============================================================================
// Session Tests - Failure Handling
// ============================================================================

#[tokio::test]
async fn test_dispatch_failures_are_reported_and_still_logged() {
    let mock = MockActuator::new().failing_speech();
    let mut h = harness_with(abc_script(), SessionOptions::default(), mock);

    let step = h.session.begin().await.unwrap();
    assert_eq!(step.failures.len(), 1);
    assert_eq!(step.rows, 1);

    let step = h.session.handle(Command::Advance).await.unwrap();
    assert_eq!(step.state, SessionState::Running);
    assert_eq!(h.session.current().unwrap().1.text, "B");
    assert_eq!(read_rows(&h.log_path).len(), 3);
}

#[tokio::test]
async fn test_every_event_gets_one_row_in_order() {
    let mut h = harness(two_by_two(), SessionOptions::default());
    h.session.begin().await.unwrap();
    h.session.handle(Command::Shortcut(Shortcut::Yes)).await.unwrap();
    h.session.handle(Command::Advance).await.unwrap();
    h.session.handle(Command::Custom("ok".into())).await.unwrap();
    h.session.handle(Command::Retreat).await.unwrap();
    h.session.handle(Command::Quit).await.unwrap();
    let path = h.session.close().unwrap();

    let rows = read_rows(&path);
    let texts: Vec<&str> = rows[1..].iter().map(|r| r[3].as_str()).collect();
    assert_eq!(
        texts,
        vec!["Hello", "[Shortcut] yes", "How are you?", "[Custom] ok", "Hello"]
    );
    let stamps: Vec<f64> = rows[1..].iter().map(|r| r[0].parse().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

/// Motion returns at once; every utterance takes 400 ms to be acknowledged.
#[derive(Debug, Clone, Copy)]
struct SlowSpeech;

#[async_trait]
impl Actuator for SlowSpeech {
    async fn speak(&self, _text: &str) -> Result<(), DispatchError> {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok(())
    }

    async fn trigger(&self, _code: u32) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_motion_row_is_stamped_when_motion_is_sent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.csv");
    let log = EventLog::create(&path).unwrap();
    let dispatcher = Dispatcher::new(SlowSpeech, ShortcutVocabulary::default());
    let mut session = Session::new(
        script_from("1;d;1;Hello;3\n"),
        dispatcher,
        log,
        SessionOptions::default(),
    );

    session.begin().await.unwrap();

    let rows = read_rows(&path);
    assert_eq!(rows[1][3], "[Motion] 3");
    assert_eq!(rows[2][3], "Hello");
    let motion: f64 = rows[1][0].parse().unwrap();
    let speech: f64 = rows[2][0].parse().unwrap();
    assert!(motion < 0.2, "motion row stamped {} (after the speech send)", motion);
    assert!(speech >= 0.35, "speech row stamped {}", speech);
}

// ============================================================================
// Randomization Tests
// ============================================================================

#[test]
fn test_randomize_small_scripts_is_noop() {
    use rand::SeedableRng;
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);

    let mut one = script_from("1;A;1;a;\n");
    one.randomize_middle(&mut rng);
    assert_eq!(one.phase_numbers(), vec![1]);

    let mut two = script_from("1;A;1;a;\n2;B;1;b;\n");
    two.randomize_middle(&mut rng);
    assert_eq!(two.phase_numbers(), vec![1, 2]);
}

#[test]
fn test_randomize_eventually_reorders_middle() {
    use rand::SeedableRng;
    let original = script_from("1;A;1;a;\n2;B;1;b;\n3;C;1;c;\n4;D;1;d;\n5;E;1;e;\n6;F;1;f;\n");

    let mut saw_change = false;
    for seed in 0..20 {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut script = original.clone();
        script.randomize_middle(&mut rng);
        let order = script.phase_numbers();
        assert_eq!(order[0], 1);
        assert_eq!(order[5], 6);
        if order != original.phase_numbers() {
            saw_change = true;
        }
    }
    assert!(saw_change);
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = SessionConfig::default();
    assert_eq!(config.script, PathBuf::from("esep.csv"));
    assert_eq!(config.delimiter_byte(), b';');
    assert!(!config.randomize_phases);
    assert!(!config.shortcut_advances);
    assert!(!config.recording.enabled);
    assert_eq!(config.shortcuts.yes_motion, 0);
    assert_eq!(config.shortcuts.no_motion, 1);
}

#[test]
fn test_config_empty_file_is_default() {
    let config = SessionConfig::parse("", Path::new("esep.toml")).unwrap();
    assert_eq!(config, SessionConfig::default());
}

#[test]
fn test_config_partial_override() {
    let text = r#"
        script = "protocols/pilot.csv"
        randomize_phases = true

        [actuator]
        base_url = "http://epi.local:8000/command"
        timeout_ms = 1000

        [shortcuts]
        yes_text = "ja"

        [recording]
        enabled = true
        frame_rate = 25
    "#;
    let config = SessionConfig::parse(text, Path::new("esep.toml")).unwrap();
    assert_eq!(config.script, PathBuf::from("protocols/pilot.csv"));
    assert!(config.randomize_phases);
    assert_eq!(config.actuator.base_url, "http://epi.local:8000/command");
    assert_eq!(config.actuator.speech_endpoint, "EpiSpeech.say/0/0");
    assert_eq!(config.actuator.timeout_ms, 1000);
    assert_eq!(config.shortcuts.yes_text, "ja");
    assert_eq!(config.shortcuts.no_text, "no");
    assert!(config.recording.enabled);
    assert_eq!(config.recording.frame_rate, 25);
    assert_eq!(config.recording.quality, 5);
}

#[test]
fn test_config_invalid_toml() {
    let err = SessionConfig::parse("randomize_phases = \"maybe\"", Path::new("bad.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("bad.toml"));
}

#[test]
fn test_config_explicit_missing_file_is_error() {
    let err = SessionConfig::load_or_default(Some(Path::new("/no/such/esep.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_config_load_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("esep.toml");
    std::fs::write(&path, "script_delimiter = \",\"\nshortcut_advances = true\n").unwrap();

    let config = SessionConfig::load(&path).unwrap();
    assert_eq!(config.delimiter_byte(), b',');
    assert!(config.session_options().shortcut_advances);
}

#[test]
fn test_config_non_ascii_delimiter_falls_back() {
    let config = SessionConfig {
        script_delimiter: '§',
        ..SessionConfig::default()
    };
    assert_eq!(config.delimiter_byte(), b';');
}

#[test]
fn test_artifact_names_are_stamped() {
    let config = SessionConfig {
        log_dir: PathBuf::from("logs"),
        video_dir: PathBuf::from("video"),
        ..SessionConfig::default()
    };
    let now = chrono::Utc.with_ymd_and_hms(2024, 12, 10, 9, 5, 30).unwrap();

    let paths = config.artifacts(&now);

    assert_eq!(paths.log, PathBuf::from("logs/experiment_log_2024-12-10_0905.csv"));
    assert_eq!(paths.video, PathBuf::from("video/experiment_log_2024-12-10_0905.mkv"));
    assert_eq!(paths.trace, PathBuf::from("logs/esep.trace.log"));
}

// ============================================================================
// Recording Tests
// ============================================================================

#[test]
fn test_ffmpeg_command_line() {
    let config = RecordingConfig::default();
    let cmd = CaptureCommand::ffmpeg(&config, Path::new("out.mkv"));
    assert_eq!(cmd.program, "ffmpeg");
    assert_eq!(
        cmd.args,
        vec![
            "-loglevel",
            "quiet",
            "-i",
            "http://righteye.local:8080/stream/video.mjpeg",
            "-r",
            "12",
            "-c:v",
            "mjpeg",
            "-q:v",
            "5",
            "out.mkv",
        ]
    );
}

#[tokio::test]
async fn test_recording_spawn_failure() {
    let supervisor = RecordingSupervisor::new(Duration::from_secs(1));
    let cmd = CaptureCommand::new("esep-no-such-capture-binary", &[]);
    let err = supervisor.start(&cmd, Path::new("out.mkv")).unwrap_err();
    assert!(matches!(err, RecordingError::Spawn { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_recording_start_and_stop() {
    let supervisor = RecordingSupervisor::new(Duration::from_secs(5));
    let cmd = CaptureCommand::new("sleep", &["30"]);

    let mut recording = supervisor.start(&cmd, Path::new("out.mkv")).unwrap();
    assert!(recording.id().is_some());
    assert!(recording.is_running());
    assert_eq!(recording.output(), Path::new("out.mkv"));

    let status = recording.stop().await.unwrap();
    assert!(!status.success());
}

#[cfg(unix)]
#[tokio::test]
async fn test_recording_stop_after_early_exit() {
    let supervisor = RecordingSupervisor::new(Duration::from_secs(5));
    let cmd = CaptureCommand::new("true", &[]);

    let mut recording = supervisor.start(&cmd, Path::new("out.mkv")).unwrap();
    for _ in 0..50 {
        if !recording.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let status = recording.stop().await.unwrap();
    assert!(status.success());
}

#[cfg(unix)]
#[tokio::test]
async fn test_recording_stubborn_process_is_killed() {
    let supervisor = RecordingSupervisor::new(Duration::from_millis(300));
    let cmd = CaptureCommand::new("sh", &["-c", "trap '' TERM; sleep 30"]);

    let recording = supervisor.start(&cmd, Path::new("out.mkv")).unwrap();
    // Give the shell time to install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    let status = recording.stop().await.unwrap();
    assert!(!status.success());
    assert!(started.elapsed() < Duration::from_secs(5));
}
