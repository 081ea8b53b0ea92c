use std::sync::{Arc, Mutex};

use crate::{session::Session, Error, Result};

/// Capability set every installable console must carry.
pub trait Console: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn send(&mut self, command: &str, get_result: bool, force_prompt: bool)
        -> Result<Option<String>>;
    fn last_output(&self) -> Option<String>;
}

impl Console for Session {
    fn open(&mut self) -> Result<()> {
        Session::open(self)
    }

    fn close(&mut self) {
        Session::close(self)
    }

    fn is_open(&self) -> bool {
        Session::is_open(self)
    }

    fn send(
        &mut self,
        command: &str,
        get_result: bool,
        force_prompt: bool,
    ) -> Result<Option<String>> {
        Session::send(self, command, get_result, force_prompt)
    }

    fn last_output(&self) -> Option<String> {
        Session::last_output(self).map(|s| s.to_string())
    }
}

/// The lock is the per-console exclusion: a holder keeps it for a full
/// send-and-capture cycle, so two callers can never interleave on one
/// transport.
pub type SharedConsole = Arc<Mutex<dyn Console>>;

/// Capability set for shell behavior layered over a console.
pub trait Shell: Send {
    /// Re-parents the shell onto a console (or detaches it with `None`).
    fn attach(&mut self, console: Option<SharedConsole>);

    fn console(&self) -> Option<SharedConsole>;

    /// Runs a command and returns its captured output.
    fn run(&mut self, command: &str) -> Result<String>;

    /// Fire-and-forget variant for commands that never return, such as
    /// `reboot`.
    fn run_quiet(&mut self, command: &str) -> Result<()>;
}

/// Shell behavior for POSIX-ish targets.
pub struct PosixShell {
    console: Option<SharedConsole>,
}

impl PosixShell {
    pub fn new() -> PosixShell {
        PosixShell { console: None }
    }

    fn attached(&self) -> Result<&SharedConsole> {
        self.console
            .as_ref()
            .ok_or(Error::CapabilityNotFound("console"))
    }
}

impl Default for PosixShell {
    fn default() -> PosixShell {
        PosixShell::new()
    }
}

impl Shell for PosixShell {
    fn attach(&mut self, console: Option<SharedConsole>) {
        self.console = console;
    }

    fn console(&self) -> Option<SharedConsole> {
        self.console.clone()
    }

    fn run(&mut self, command: &str) -> Result<String> {
        let console = self.attached()?;
        let mut console = console.lock().unwrap();

        console
            .send(command, true, true)
            .map(|output| output.unwrap_or_default())
    }

    fn run_quiet(&mut self, command: &str) -> Result<()> {
        let console = self.attached()?;
        let mut console = console.lock().unwrap();

        console.send(command, false, true).map(|_| ())
    }
}

/// One command surface for "however we currently talk to this board".
///
/// Calls go to the shell first, then to the bare console, and fail with
/// `CapabilityNotFound` when neither half is installed. Swapping the console
/// (serial today, telnet tomorrow) closes the old one and re-parents the
/// shell, so test bodies never notice the change.
pub struct BoardConsole {
    console: Option<SharedConsole>,
    shell: Option<Box<dyn Shell>>,
}

impl BoardConsole {
    pub fn new() -> BoardConsole {
        BoardConsole {
            console: None,
            shell: None,
        }
    }

    /// Installs a console, closing the previous one first. The trait bound
    /// rejects non-console values at the install site.
    pub fn install_console<C: Console + 'static>(&mut self, console: C) {
        self.swap_console(Some(Arc::new(Mutex::new(console))));
    }

    pub fn remove_console(&mut self) {
        self.swap_console(None);
    }

    fn swap_console(&mut self, console: Option<SharedConsole>) {
        if let Some(old) = self.console.take() {
            old.lock().unwrap().close();
        }

        self.console = console;

        if let Some(shell) = self.shell.as_mut() {
            shell.attach(self.console.clone());
        }
    }

    pub fn install_shell<S: Shell + 'static>(&mut self, shell: S) {
        let mut shell = Box::new(shell);
        shell.attach(self.console.clone());

        self.shell = Some(shell);
    }

    pub fn has_console(&self) -> bool {
        self.console.is_some()
    }

    pub fn open(&mut self) -> Result<()> {
        match &self.console {
            Some(console) => console.lock().unwrap().open(),
            None => Err(Error::CapabilityNotFound("open")),
        }
    }

    pub fn close(&mut self) {
        if let Some(console) = &self.console {
            console.lock().unwrap().close();
        }
    }

    pub fn is_open(&self) -> bool {
        match &self.console {
            Some(console) => console.lock().unwrap().is_open(),
            None => false,
        }
    }

    pub fn run(&mut self, command: &str) -> Result<String> {
        if let Some(shell) = self.shell.as_mut() {
            return shell.run(command);
        }

        if let Some(console) = &self.console {
            let mut console = console.lock().unwrap();

            return console
                .send(command, true, true)
                .map(|output| output.unwrap_or_default());
        }

        Err(Error::CapabilityNotFound("run"))
    }

    pub fn run_quiet(&mut self, command: &str) -> Result<()> {
        if let Some(shell) = self.shell.as_mut() {
            return shell.run_quiet(command);
        }

        if let Some(console) = &self.console {
            let mut console = console.lock().unwrap();

            return console.send(command, false, true).map(|_| ());
        }

        Err(Error::CapabilityNotFound("run_quiet"))
    }

    pub fn last_output(&self) -> Option<String> {
        self.console
            .as_ref()
            .and_then(|console| console.lock().unwrap().last_output())
    }
}

impl Default for BoardConsole {
    fn default() -> BoardConsole {
        BoardConsole::new()
    }
}
