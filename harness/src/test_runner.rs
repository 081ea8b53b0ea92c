use serde::{Deserialize, Serialize};

use crate::{log::LogCtx, Result};

type StepFn<C> = Box<dyn FnMut(&mut C) -> Result<()>>;
type BodyFn<C> = Box<dyn FnMut(&mut C) -> Result<Option<bool>>>;
type ConditionFn<C> = Box<dyn FnMut(&SuiteStats, &mut C) -> bool>;
type ReportFn<C> = Box<dyn FnMut(&SuiteStats, &mut C) -> Result<()>>;

/// Suite counters. All six reset to zero at the start of every suite run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SuiteStats {
    pub tests_run: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub iterations_run: u32,
    pub iterations_passed: u32,
    pub iterations_failed: u32,
}

/// One test: optional setup, body, and teardown closures over a shared
/// context (usually the board under test).
///
/// The result is tri-state: a body returning `Ok(Some(..))` records a
/// verdict, `Ok(None)` leaves the case unset, which counts as neither pass
/// nor fail. A body error is a failed case, never a crashed run. Teardown
/// runs no matter what came before it.
pub struct TestCase<C> {
    name: String,
    setup: Option<StepFn<C>>,
    body: Option<BodyFn<C>>,
    teardown: Option<StepFn<C>>,
    result: Option<bool>,
}

impl<C> TestCase<C> {
    pub fn new(name: &str) -> TestCase<C> {
        TestCase {
            name: name.to_string(),
            setup: None,
            body: None,
            teardown: None,
            result: None,
        }
    }

    pub fn setup(mut self, f: impl FnMut(&mut C) -> Result<()> + 'static) -> TestCase<C> {
        self.setup = Some(Box::new(f));
        self
    }

    pub fn body(mut self, f: impl FnMut(&mut C) -> Result<Option<bool>> + 'static) -> TestCase<C> {
        self.body = Some(Box::new(f));
        self
    }

    pub fn teardown(mut self, f: impl FnMut(&mut C) -> Result<()> + 'static) -> TestCase<C> {
        self.teardown = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> Option<bool> {
        self.result
    }

    pub fn run(&mut self, ctx: &mut C, log: &mut LogCtx) {
        self.result = None;

        log.enter(&self.name);

        let setup_ok = match self.setup.as_mut() {
            Some(setup) => match setup(ctx) {
                Ok(()) => true,
                Err(e) => {
                    log.error(&format!("setup failed: {}", e));
                    false
                }
            },
            None => true,
        };

        // A body only runs on a prepared context; its verdict would be
        // meaningless otherwise.
        if setup_ok {
            if let Some(body) = self.body.as_mut() {
                match body(ctx) {
                    Ok(Some(true)) => {
                        self.result = Some(true);
                        log.success("passed");
                    }
                    Ok(Some(false)) => {
                        self.result = Some(false);
                        log.error("failed");
                    }
                    Ok(None) => log.debug("no verdict"),
                    Err(e) => {
                        self.result = Some(false);
                        log.error(&format!("failed: {}", e));
                    }
                }
            }
        }

        if let Some(teardown) = self.teardown.as_mut() {
            if let Err(e) = teardown(ctx) {
                log.warn(&format!("teardown failed: {}", e));
            }
        }

        log.leave();
    }
}

/// Ordered collection of test cases plus the loop that drives them.
///
/// `run` resets the counters, runs suite setup, then loops iterations while
/// the run condition holds (exactly one iteration when none is configured),
/// reporting every `report_every` iterations and once more after the loop.
/// Setup and report errors propagate; case failures only move counters. With
/// `forever()` the whole reset-setup-loop-report cycle repeats indefinitely.
pub struct TestSuite<C> {
    name: String,
    cases: Vec<TestCase<C>>,
    setup: Option<StepFn<C>>,
    report: Option<ReportFn<C>>,
    condition: Option<ConditionFn<C>>,
    report_every: Option<u32>,
    run_forever: bool,
    stats: SuiteStats,
}

impl<C> TestSuite<C> {
    pub fn new(name: &str) -> TestSuite<C> {
        TestSuite {
            name: name.to_string(),
            cases: Vec::new(),
            setup: None,
            report: None,
            condition: None,
            report_every: None,
            run_forever: false,
            stats: SuiteStats::default(),
        }
    }

    pub fn case(mut self, case: TestCase<C>) -> TestSuite<C> {
        self.cases.push(case);
        self
    }

    pub fn setup(mut self, f: impl FnMut(&mut C) -> Result<()> + 'static) -> TestSuite<C> {
        self.setup = Some(Box::new(f));
        self
    }

    pub fn report(
        mut self,
        f: impl FnMut(&SuiteStats, &mut C) -> Result<()> + 'static,
    ) -> TestSuite<C> {
        self.report = Some(Box::new(f));
        self
    }

    /// Iterations keep going while `f` holds; it is consulted before every
    /// iteration with the live counters.
    pub fn run_while(
        mut self,
        f: impl FnMut(&SuiteStats, &mut C) -> bool + 'static,
    ) -> TestSuite<C> {
        self.condition = Some(Box::new(f));
        self
    }

    pub fn report_every(mut self, iterations: u32) -> TestSuite<C> {
        self.report_every = Some(iterations);
        self
    }

    pub fn forever(mut self) -> TestSuite<C> {
        self.run_forever = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &SuiteStats {
        &self.stats
    }

    pub fn run(&mut self, ctx: &mut C, log: &mut LogCtx) -> Result<SuiteStats> {
        loop {
            self.stats = SuiteStats::default();

            log.enter(&self.name);

            if let Some(setup) = self.setup.as_mut() {
                setup(ctx).map_err(|e| {
                    log.leave();
                    e
                })?;
            }

            if self.condition.is_some() {
                loop {
                    let proceed = match self.condition.as_mut() {
                        Some(condition) => condition(&self.stats, ctx),
                        None => false,
                    };

                    if !proceed {
                        break;
                    }

                    self.run_iteration(ctx, log);

                    if let Some(every) = self.report_every {
                        if every > 0 && self.stats.iterations_run % every == 0 {
                            self.send_report(ctx, log)?;
                        }
                    }
                }
            } else {
                self.run_iteration(ctx, log);
            }

            self.send_report(ctx, log)?;

            log.leave();

            if !self.run_forever {
                return Ok(self.stats.clone());
            }
        }
    }

    /// One iteration runs every case in insertion order; an earlier failure
    /// never short-circuits the rest.
    fn run_iteration(&mut self, ctx: &mut C, log: &mut LogCtx) {
        self.stats.iterations_run += 1;

        let mut any_failed = false;

        for case in self.cases.iter_mut() {
            case.run(ctx, log);

            self.stats.tests_run += 1;

            match case.result() {
                Some(true) => self.stats.tests_passed += 1,
                Some(false) => {
                    self.stats.tests_failed += 1;
                    any_failed = true;
                }
                None => {}
            }
        }

        if any_failed {
            self.stats.iterations_failed += 1;
        } else {
            self.stats.iterations_passed += 1;
        }
    }

    fn send_report(&mut self, ctx: &mut C, log: &mut LogCtx) -> Result<()> {
        if let Some(report) = self.report.as_mut() {
            report(&self.stats, ctx).map_err(|e| {
                log.leave();
                e
            })?;
        }

        Ok(())
    }
}
