use std::{
    cell::Cell,
    rc::Rc,
    sync::{Arc, Mutex},
    time::Duration,
};

use harness::{
    board::{Board, PowerControl},
    console::{BoardConsole, PosixShell},
    log::LogCtx,
    session::{Session, SessionConfig, DEFAULT_PROMPT},
    test_runner::{TestCase, TestSuite},
    transport::{FakeStep, FakeTransport},
    Result,
};

fn fast_config() -> SessionConfig {
    let mut config = SessionConfig::new();
    config.timeout_ticks = 10;
    config.poll_interval = Duration::from_millis(1);
    config.open_backoff = Duration::from_millis(1);
    config
}

/// Steps one captured command consumes: the prompt reconfiguration settles
/// over four polls, the reply plus prompt settles over four more, and the
/// prompt wait spends one.
fn command_cycle(reply: &str) -> Vec<FakeStep> {
    vec![
        FakeStep::feed(b"export PS1\n"),
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::feed(format!("{}{}", reply, DEFAULT_PROMPT).as_bytes()),
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::Idle,
    ]
}

fn board_over(script: Vec<FakeStep>) -> (Board, harness::transport::FakeHandle) {
    let fake = FakeTransport::with_script(script);
    let handle = fake.handle();

    let session = Session::new(Box::new(fake), fast_config(), LogCtx::new());

    let mut console = BoardConsole::new();
    console.install_console(session);
    console.install_shell(PosixShell::new());

    (Board::new("bench", console), handle)
}

#[test]
fn suite_drives_commands_over_a_scripted_console() {
    let mut script = Vec::new();
    for _ in 0..2 {
        script.extend(command_cycle("hil-ok\n"));
        script.extend(command_cycle("nothing here\n"));
    }

    let (mut board, handle) = board_over(script);

    let reports = Rc::new(Cell::new(0u32));
    let reports_seen = reports.clone();

    let mut suite = TestSuite::new("scripted bench")
        .setup(|board: &mut Board| board.console.open())
        .case(TestCase::new("echo").body(|board: &mut Board| {
            let output = board.console.run("echo hil-ok")?;

            assert!(!output.contains(DEFAULT_PROMPT));

            Ok(Some(output.contains("hil-ok")))
        }))
        .case(TestCase::new("marker").body(|board: &mut Board| {
            let output = board.console.run("cat /etc/marker")?;

            Ok(Some(output.contains("missing-marker")))
        }))
        .run_while(|stats, _| stats.iterations_run < 2)
        .report_every(1)
        .report(move |_, _| {
            reports_seen.set(reports_seen.get() + 1);

            Ok(())
        });

    let stats = suite.run(&mut board, &mut LogCtx::new()).unwrap();

    assert_eq!(stats.iterations_run, 2);
    assert_eq!(stats.iterations_passed, 0);
    assert_eq!(stats.iterations_failed, 2);
    assert_eq!(stats.tests_run, 4);
    assert_eq!(stats.tests_passed, 2);
    assert_eq!(stats.tests_failed, 2);

    // One report per iteration at cadence 1, plus the unconditional final.
    assert_eq!(reports.get(), 3);

    // Each captured command writes the prompt setup line then the command.
    let writes = handle.writes();
    assert_eq!(writes.len(), 8);
    assert_eq!(writes[0], format!("export PS1='{}'\n", DEFAULT_PROMPT));
    assert_eq!(writes[1], "echo hil-ok\n");
    assert_eq!(handle.connect_calls(), 1);
}

#[test]
fn losing_the_prompt_fails_the_case_but_not_the_suite() {
    // Reply settles but never shows a prompt.
    let script = vec![
        FakeStep::feed(b"export PS1\n"),
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::feed(b"still printing, no prompt"),
        FakeStep::Idle,
        FakeStep::Idle,
        FakeStep::Idle,
    ];

    let (mut board, _) = board_over(script);

    let mut suite = TestSuite::new("flaky link").case(TestCase::new("echo").body(
        |board: &mut Board| {
            let output = board.console.run("echo hil-ok")?;

            Ok(Some(output.contains("hil-ok")))
        },
    ));

    let stats = suite.run(&mut board, &mut LogCtx::new()).unwrap();

    assert_eq!(stats.tests_run, 1);
    assert_eq!(stats.tests_failed, 1);
    assert_eq!(stats.iterations_failed, 1);
    // The session survives the missed prompt.
    assert!(board.console.is_open());
}

struct RecordingPower {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl PowerControl for RecordingPower {
    fn on(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("on");

        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("off");

        Ok(())
    }
}

#[test]
fn test_bodies_reach_power_control_through_the_board() {
    let (board, _) = board_over(command_cycle("up 4 days\n"));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut board = board.with_power(RecordingPower {
        calls: calls.clone(),
    });

    let mut suite = TestSuite::new("recovery")
        .case(TestCase::new("uptime").body(|board: &mut Board| {
            let output = board.console.run("uptime")?;

            Ok(Some(output.contains("up")))
        }))
        .case(TestCase::new("power cycle").body(|board: &mut Board| {
            board.power()?.restart()?;

            Ok(Some(true))
        }));

    let stats = suite.run(&mut board, &mut LogCtx::new()).unwrap();

    assert_eq!(stats.tests_passed, 2);
    assert_eq!(*calls.lock().unwrap(), vec!["off", "on"]);
}
