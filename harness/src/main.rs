use std::{
    process,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use harness::{
    board::{Board, CommandPower, CommandStorage},
    console::{BoardConsole, PosixShell},
    log::LogCtx,
    options::{ConsoleKind, Options},
    report::{SuiteReport, TestReportValue},
    sampler::AsyncSampler,
    session::{Login, Session, SessionConfig},
    test_runner::{TestCase, TestSuite},
    transport::{ProcessTransport, SerialTransport, Transport},
};

fn build_board(options: &Options) -> Board {
    let transport: Box<dyn Transport> = match options.console {
        ConsoleKind::Serial => Box::new(SerialTransport::new(
            &options.serial_port,
            options.baud_rate,
        )),
        ConsoleKind::Process => Box::new(ProcessTransport::local(&options.console_command)),
        ConsoleKind::Remote => Box::new(ProcessTransport::remote(&options.console_command)),
    };

    let mut config = match &options.prompt {
        Some(prompt) => SessionConfig::with_prompt(prompt),
        None => SessionConfig::new(),
    };
    config.timeout_ticks = options.timeout_ticks;

    if let (Some(username), Some(password)) = (&options.login_username, &options.login_password) {
        config.login = Some(Login {
            username: username.clone(),
            password: password.clone(),
            username_prompt: "login:".to_string(),
            password_prompt: "Password:".to_string(),
        });
    }

    let session = Session::new(transport, config, LogCtx::new());

    let mut console = BoardConsole::new();
    console.install_console(session);
    console.install_shell(PosixShell::new());

    let mut board = Board::new("bench", console);

    if let (Some(on), Some(off)) = (&options.power_on_command, &options.power_off_command) {
        board = board.with_power(CommandPower::new(on, off));
    }

    if let (Some(to_host), Some(to_board)) = (
        &options.storage_to_host_command,
        &options.storage_to_board_command,
    ) {
        board = board.with_storage(CommandStorage::new(to_host, to_board));
    }

    board
}

fn record_step(
    report: &Arc<Mutex<SuiteReport>>,
    step: &str,
    condition: &str,
    value: &str,
    failed: bool,
    started_at: chrono::DateTime<chrono::Utc>,
) {
    report.lock().unwrap().add_value(TestReportValue::new(
        step,
        condition,
        value,
        None::<&str>,
        failed,
        started_at,
        chrono::Utc::now(),
    ));
}

fn build_suite(
    options: &Options,
    report: Arc<Mutex<SuiteReport>>,
    progress: Arc<AtomicU32>,
) -> TestSuite<Board> {
    let iterations = options.iterations;

    let echo_report = report.clone();
    let uptime_report = report.clone();

    let mut suite = TestSuite::new("smoke")
        .setup(|board: &mut Board| board.console.open())
        .case(TestCase::new("console echo").body(move |board: &mut Board| {
            let started_at = chrono::Utc::now();
            let output = board.console.run("echo hil-ok")?;
            let passed = output.contains("hil-ok");

            record_step(
                &echo_report,
                "console echo",
                "console echoes the marker back",
                output.trim(),
                !passed,
                started_at,
            );

            Ok(Some(passed))
        }))
        .case(TestCase::new("uptime probe").body(move |board: &mut Board| {
            let started_at = chrono::Utc::now();
            let output = board.console.run("uptime")?;
            let passed = !output.trim().is_empty();

            record_step(
                &uptime_report,
                "uptime probe",
                "board reports an uptime",
                output.trim(),
                !passed,
                started_at,
            );

            Ok(Some(passed))
        }));

    if options.power_on_command.is_some() && options.power_off_command.is_some() {
        let power_report = report.clone();

        suite = suite.case(TestCase::new("power cycle").body(move |board: &mut Board| {
            let started_at = chrono::Utc::now();
            board.power()?.restart()?;

            record_step(
                &power_report,
                "power cycle",
                "relay accepts off/on",
                "cycled",
                false,
                started_at,
            );

            Ok(Some(true))
        }));
    }

    if options.storage_to_host_command.is_some() && options.storage_to_board_command.is_some() {
        let storage_report = report.clone();

        suite = suite.case(TestCase::new("storage switch").body(move |board: &mut Board| {
            let started_at = chrono::Utc::now();
            board.storage()?.switch_to_host()?;
            board.storage()?.switch_to_board()?;

            record_step(
                &storage_report,
                "storage switch",
                "mux reaches both sides",
                "switched",
                false,
                started_at,
            );

            Ok(Some(true))
        }));
    }

    let snapshot_report = report;

    suite = suite
        .run_while(move |stats, _| {
            progress.store(stats.iterations_run, Ordering::SeqCst);

            stats.iterations_run < iterations
        })
        .report(move |stats, _| {
            snapshot_report.lock().unwrap().stats = stats.clone();

            Ok(())
        });

    if let Some(every) = options.report_every {
        suite = suite.report_every(every);
    }

    if options.run_forever {
        suite = suite.forever();
    }

    suite
}

fn main() {
    let options = Options::parse();
    let mut log = LogCtx::new();

    let mut board = build_board(&options);

    let report = Arc::new(Mutex::new(SuiteReport::new("smoke")));
    let progress = Arc::new(AtomicU32::new(0));

    let mut suite = build_suite(&options, report.clone(), progress.clone());

    let mut sampler = AsyncSampler::new();
    let progress_view = progress.clone();
    sampler.start(2.0, None, move || progress_view.load(Ordering::SeqCst));

    log.enter("rig");

    match suite.run(&mut board, &mut log) {
        Ok(stats) => {
            let samples = sampler.stop();
            log.debug(&format!("captured {} progress samples", samples.len()));

            let failed = stats.tests_failed > 0;

            log.info(&format!(
                "{}/{} tests passed over {} iterations",
                stats.tests_passed, stats.tests_run, stats.iterations_run
            ));

            {
                let mut report = report.lock().unwrap();
                report.finish(stats);

                if let Err(e) = report.write_json(&options.report_path) {
                    log.error(&format!("could not write {}: {}", options.report_path, e));
                }
            }

            log.leave();

            if failed {
                process::exit(1);
            }
        }
        Err(e) => {
            sampler.stop();

            log.fatal(&format!("suite aborted: {}", e));

            process::exit(1);
        }
    }
}
