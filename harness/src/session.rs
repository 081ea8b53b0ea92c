use std::{thread, time};

use regex::Regex;

use crate::{
    log::LogCtx,
    transport::{self, Transport},
    Error, Result,
};

/// Credentials plus the prompts a remote console shows before accepting them.
pub struct Login {
    pub username: String,
    pub password: String,
    pub username_prompt: String,
    pub password_prompt: String,
}

pub struct SessionConfig {
    /// Literal the remote shell is told to use as its prompt. Improbable on
    /// purpose so stale output can never be mistaken for it.
    pub prompt: String,
    pub prompt_pattern: Regex,
    /// Command that reconfigures the remote shell's prompt, written before a
    /// captured command when `force_prompt` is requested.
    pub set_prompt_command: Option<String>,
    /// Deadline for quiet/prompt waits, in polls of `poll_interval`.
    pub timeout_ticks: u32,
    pub poll_interval: time::Duration,
    /// Consecutive unchanged non-zero pending-byte polls that declare the
    /// link quiet.
    pub quiet_threshold: u32,
    pub open_backoff: time::Duration,
    pub login: Option<Login>,
}

pub const DEFAULT_PROMPT: &str = "@hil@ ";

impl SessionConfig {
    pub fn new() -> SessionConfig {
        Self::with_prompt(DEFAULT_PROMPT)
    }

    pub fn with_prompt(prompt: &str) -> SessionConfig {
        SessionConfig {
            prompt: prompt.to_string(),
            prompt_pattern: Regex::new(&regex::escape(prompt)).unwrap(),
            set_prompt_command: Some(format!("export PS1='{}'", prompt)),
            timeout_ticks: 100,
            poll_interval: time::Duration::from_millis(100),
            quiet_threshold: 3,
            open_backoff: time::Duration::from_secs(1),
            login: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig::new()
    }
}

/// Interactive command session over one exclusively-owned transport.
///
/// `open` retries up to the transport's attempt budget with a backoff sleep
/// between attempts; end-of-stream during the login handshake means another
/// client holds the remote console and is retried like any failed attempt.
/// `send` synchronizes on a quiet link before and after writing so output of
/// a previous command is never captured as the reply to the next one.
pub struct Session {
    transport: Box<dyn Transport>,
    config: SessionConfig,
    log: LogCtx,
    open: bool,
    backoffs: u32,
    last_output: Option<String>,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig, log: LogCtx) -> Session {
        Session {
            transport,
            config,
            log,
            open: false,
            backoffs: 0,
            last_output: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Most recent output captured by `send(.., get_result = true, ..)`.
    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }

        let attempts = self.transport.open_attempts();
        let mut last_failure = String::new();
        self.backoffs = 0;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.backoffs += 1;
                thread::sleep(self.config.open_backoff);
            }

            match self.try_open() {
                Ok(()) => {
                    self.open = true;
                    self.log
                        .info(&format!("opened console on {}", self.transport.describe()));

                    return Ok(());
                }
                Err(Error::EndOfStream) => {
                    // Another client holds the remote console; contention
                    // clears, so keep the attempt budget running.
                    self.log.warn(&format!(
                        "console is in use by another client ({}/{}), backing off",
                        attempt, attempts
                    ));

                    last_failure = "console in use by another client".to_string();
                    self.transport.disconnect();
                }
                Err(e) => {
                    self.log
                        .warn(&format!("open attempt {}/{} failed: {}", attempt, attempts, e));

                    last_failure = e.to_string();
                    self.transport.disconnect();
                }
            }
        }

        Err(Error::Connection(format!(
            "{}: gave up after {} attempts: {}",
            self.transport.describe(),
            attempts,
            last_failure
        )))
    }

    fn try_open(&mut self) -> Result<()> {
        self.transport.connect()?;

        if self.transport.needs_login() {
            self.handshake()?;
        }

        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        let (username, password, username_prompt, password_prompt) = match &self.config.login {
            Some(login) => (
                login.username.clone(),
                login.password.clone(),
                login.username_prompt.clone(),
                login.password_prompt.clone(),
            ),
            None => return Ok(()),
        };

        self.wait_for_text(&username_prompt)?;
        self.write_line(&username)?;
        self.wait_for_text(&password_prompt)?;
        self.write_line(&password)?;

        Ok(())
    }

    /// Flushes unread bytes and releases the transport. Closing a closed
    /// session is a no-op.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }

        let _ = self.transport.discard_pending();
        self.transport.disconnect();
        self.open = false;

        self.log.debug("console closed");
    }

    /// Writes `command` to the console. Opens the session first if needed.
    ///
    /// With `force_prompt` the remote shell is first told to use the
    /// configured prompt and the link is allowed to settle, so whatever a
    /// previous command is still printing cannot leak into this capture.
    /// With `get_result` the reply up to (and excluding) the prompt is
    /// returned; otherwise the write is fire-and-forget and `None` comes
    /// back.
    pub fn send(
        &mut self,
        command: &str,
        get_result: bool,
        force_prompt: bool,
    ) -> Result<Option<String>> {
        self.open()?;

        if force_prompt {
            self.sync_prompt()?;
        }

        if !get_result {
            self.log.debug(&format!("sending `{}` (no capture)", command));
            self.write_line(command)?;

            return Ok(None);
        }

        self.transport.discard_pending()?;

        self.log.debug(&format!("sending `{}`", command));
        self.write_line(command)?;

        self.wait_quiet()?;

        let output = self.wait_prompt(command)?;
        self.last_output = Some(output.clone());

        Ok(Some(output))
    }

    fn sync_prompt(&mut self) -> Result<()> {
        if let Some(set_prompt) = self.config.set_prompt_command.clone() {
            self.write_line(&set_prompt)?;
        }

        self.wait_quiet()
    }

    /// Waits for the link to go quiet: the pending-byte count must hold the
    /// same non-zero value for `quiet_threshold` consecutive polls.
    ///
    /// On deadline exhaustion the failure names the link's state:
    /// `TimeoutNoReceive` when nothing arrived at all (dead link),
    /// `TimeoutNoReceiveStop` when bytes kept coming but never settled
    /// (runaway process, log spam).
    pub fn wait_quiet(&mut self) -> Result<()> {
        let mut ticks_left = self.config.timeout_ticks;
        let mut stable_polls = 0;
        let mut last_pending = None;
        let mut received_any = false;

        while ticks_left > 0 {
            let pending = self.transport.pending_bytes()?;

            if pending > 0 {
                received_any = true;
            }

            if pending > 0 && last_pending == Some(pending) {
                stable_polls += 1;

                if stable_polls >= self.config.quiet_threshold {
                    return Ok(());
                }
            } else {
                stable_polls = 0;
            }

            last_pending = Some(pending);
            ticks_left -= 1;

            thread::sleep(self.config.poll_interval);
        }

        if received_any {
            Err(Error::TimeoutNoReceiveStop)
        } else {
            Err(Error::TimeoutNoReceive)
        }
    }

    fn wait_prompt(&mut self, command: &str) -> Result<String> {
        let mut captured = Vec::new();
        let mut ticks_left = self.config.timeout_ticks;

        while ticks_left > 0 {
            if self.transport.pending_bytes()? > 0 {
                captured.extend(self.transport.drain()?);
            }

            let text = transport::decode(&captured);

            if let Some(hit) = self.config.prompt_pattern.find(&text) {
                return Ok(text[..hit.start()].to_string());
            }

            ticks_left -= 1;

            thread::sleep(self.config.poll_interval);
        }

        Err(Error::PromptNotFound(command.to_string()))
    }

    fn wait_for_text(&mut self, marker: &str) -> Result<String> {
        let mut captured = Vec::new();
        let mut ticks_left = self.config.timeout_ticks;

        while ticks_left > 0 {
            if self.transport.pending_bytes()? > 0 {
                captured.extend(self.transport.drain()?);

                let text = transport::decode(&captured);

                if text.contains(marker) {
                    return Ok(text);
                }
            }

            ticks_left -= 1;

            thread::sleep(self.config.poll_interval);
        }

        Err(Error::PromptNotFound(marker.to_string()))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{}{}", line, self.transport.line_sep());

        self.transport.write_all(data.as_bytes())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FakeStep, FakeTransport};

    fn test_config() -> SessionConfig {
        let mut config = SessionConfig::new();
        config.timeout_ticks = 10;
        config.poll_interval = time::Duration::from_millis(1);
        config.open_backoff = time::Duration::from_millis(1);
        config
    }

    fn session_over(fake: FakeTransport, config: SessionConfig) -> Session {
        Session::new(Box::new(fake), config, LogCtx::new())
    }

    #[test]
    fn quiet_detection_fires_on_the_third_stable_poll() {
        let fake = FakeTransport::with_script(vec![FakeStep::feed(b"boot log")]);
        let handle = fake.handle();
        let mut session = session_over(fake, test_config());

        session.open().unwrap();
        session.wait_quiet().unwrap();

        // Bytes stop changing at poll 1; three stable polls later it fires.
        assert_eq!(handle.polls(), 4);
    }

    #[test]
    fn quiet_detection_restarts_its_count_when_bytes_keep_arriving() {
        let fake = FakeTransport::with_script(vec![
            FakeStep::feed(b"a"),
            FakeStep::Idle,
            FakeStep::feed(b"b"),
        ]);
        let handle = fake.handle();
        let mut session = session_over(fake, test_config());

        session.open().unwrap();
        session.wait_quiet().unwrap();

        // The feed at poll 3 resets the stable run; quiet lands at poll 6.
        assert_eq!(handle.polls(), 6);
    }

    #[test]
    fn silent_link_times_out_as_no_receive() {
        let fake = FakeTransport::new();
        let mut session = session_over(fake, test_config());

        session.open().unwrap();

        assert!(matches!(session.wait_quiet(), Err(Error::TimeoutNoReceive)));
    }

    #[test]
    fn streaming_link_times_out_as_no_receive_stop() {
        let script = (0..10).map(|_| FakeStep::feed(b"spam")).collect();
        let fake = FakeTransport::with_script(script);
        let mut session = session_over(fake, test_config());

        session.open().unwrap();

        assert!(matches!(
            session.wait_quiet(),
            Err(Error::TimeoutNoReceiveStop)
        ));
    }

    #[test]
    fn send_captures_output_up_to_but_not_including_the_prompt() {
        let fake = FakeTransport::with_script(vec![
            // Prompt reconfiguration settles.
            FakeStep::feed(b"export PS1\n"),
            FakeStep::Idle,
            FakeStep::Idle,
            FakeStep::Idle,
            // Command reply plus the prompt.
            FakeStep::feed(b"4 days up\n@hil@ "),
            FakeStep::Idle,
            FakeStep::Idle,
            FakeStep::Idle,
        ]);
        let handle = fake.handle();
        let mut session = session_over(fake, test_config());

        let output = session.send("uptime", true, true).unwrap().unwrap();

        assert_eq!(output, "4 days up\n");
        assert!(!output.contains(DEFAULT_PROMPT));
        assert_eq!(session.last_output(), Some("4 days up\n"));
        assert!(handle.writes().contains(&"uptime\n".to_string()));
    }

    #[test]
    fn send_implicitly_opens_a_closed_session() {
        let fake = FakeTransport::new();
        let handle = fake.handle();
        let mut session = session_over(fake, test_config());

        // Fire-and-forget without force_prompt needs no scripted replies.
        session.send("reboot", false, false).unwrap();

        assert_eq!(handle.connect_calls(), 1);
        assert!(session.is_open());
        assert_eq!(handle.writes(), vec!["reboot\n".to_string()]);
    }

    #[test]
    fn missing_prompt_fails_but_leaves_the_session_open() {
        let fake = FakeTransport::with_script(vec![
            FakeStep::feed(b"noise"),
            FakeStep::Idle,
            FakeStep::Idle,
            FakeStep::Idle,
            // Reply arrives but the prompt never does.
            FakeStep::feed(b"no prompt here"),
            FakeStep::Idle,
            FakeStep::Idle,
            FakeStep::Idle,
        ]);
        let mut session = session_over(fake, test_config());

        assert!(matches!(
            session.send("uptime", true, true),
            Err(Error::PromptNotFound(_))
        ));
        assert!(session.is_open());
    }

    #[test]
    fn open_is_idempotent_and_close_is_idempotent() {
        let fake = FakeTransport::new();
        let handle = fake.handle();
        let mut session = session_over(fake, test_config());

        session.open().unwrap();
        session.open().unwrap();

        assert_eq!(handle.connect_calls(), 1);

        session.close();
        session.close();

        assert!(!session.is_open());
        assert!(!handle.is_connected());
    }

    #[test]
    fn open_retries_failed_connects_until_the_budget_runs_out() {
        let fake = FakeTransport::new().open_attempts(3);
        for _ in 0..3 {
            fake.queue_connect_failure("no such port");
        }
        let handle = fake.handle();
        let mut session = session_over(fake, test_config());

        assert!(matches!(session.open(), Err(Error::Connection(_))));
        assert_eq!(handle.connect_calls(), 3);
        assert!(!session.is_open());
    }

    #[test]
    fn contended_login_retries_and_succeeds_with_two_backoffs() {
        let fake = FakeTransport::with_script(vec![
            // First two attempts: the far end hangs up mid-handshake.
            FakeStep::Eof,
            FakeStep::Eof,
            // Third attempt: the login conversation goes through.
            FakeStep::feed(b"board login: "),
            FakeStep::feed(b"Password: "),
        ])
        .open_attempts(5)
        .needs_login();
        let handle = fake.handle();

        let mut config = test_config();
        config.login = Some(Login {
            username: "root".to_string(),
            password: "hunter2".to_string(),
            username_prompt: "login:".to_string(),
            password_prompt: "Password:".to_string(),
        });
        let mut session = session_over(fake, config);

        session.open().unwrap();

        assert_eq!(handle.connect_calls(), 3);
        assert_eq!(session.backoffs, 2);
        assert_eq!(
            handle.writes(),
            vec!["root\n".to_string(), "hunter2\n".to_string()]
        );
    }
}
