use std::{io, process};

use crate::{console::BoardConsole, Error, Result};

/// Power relay behind whatever box the bench uses.
pub trait PowerControl: Send {
    fn on(&mut self) -> Result<()>;

    fn off(&mut self) -> Result<()>;

    fn restart(&mut self) -> Result<()> {
        self.off()?;
        self.on()
    }
}

/// Removable-storage mux: the card is visible to exactly one side at a time.
pub trait StorageControl: Send {
    fn switch_to_host(&mut self) -> Result<()>;

    fn switch_to_board(&mut self) -> Result<()>;
}

fn run_host_command(command: &str) -> Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "empty command")))?;

    let output = process::Command::new(program).args(parts).output()?;

    if !output.status.success() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "`{}` exited with non-zero exit code: {}",
                command,
                String::from_utf8_lossy(&output.stderr)
            ),
        )));
    }

    Ok(())
}

/// Power control that shells out to configured host command lines, e.g. a
/// vendor relay CLI. The relay's own protocol stays outside the harness.
pub struct CommandPower {
    on_command: String,
    off_command: String,
}

impl CommandPower {
    pub fn new(on_command: &str, off_command: &str) -> CommandPower {
        CommandPower {
            on_command: on_command.to_string(),
            off_command: off_command.to_string(),
        }
    }
}

impl PowerControl for CommandPower {
    fn on(&mut self) -> Result<()> {
        run_host_command(&self.on_command)
    }

    fn off(&mut self) -> Result<()> {
        run_host_command(&self.off_command)
    }
}

/// Storage mux driven the same way.
pub struct CommandStorage {
    to_host_command: String,
    to_board_command: String,
}

impl CommandStorage {
    pub fn new(to_host_command: &str, to_board_command: &str) -> CommandStorage {
        CommandStorage {
            to_host_command: to_host_command.to_string(),
            to_board_command: to_board_command.to_string(),
        }
    }
}

impl StorageControl for CommandStorage {
    fn switch_to_host(&mut self) -> Result<()> {
        run_host_command(&self.to_host_command)
    }

    fn switch_to_board(&mut self) -> Result<()> {
        run_host_command(&self.to_board_command)
    }
}

/// One board on the bench: its console plus whatever power and storage
/// switching the bench wiring provides. Test bodies receive this as their
/// context.
pub struct Board {
    pub name: String,
    pub console: BoardConsole,
    power: Option<Box<dyn PowerControl>>,
    storage: Option<Box<dyn StorageControl>>,
}

impl Board {
    pub fn new(name: &str, console: BoardConsole) -> Board {
        Board {
            name: name.to_string(),
            console,
            power: None,
            storage: None,
        }
    }

    pub fn with_power<P: PowerControl + 'static>(mut self, power: P) -> Board {
        self.power = Some(Box::new(power));
        self
    }

    pub fn with_storage<S: StorageControl + 'static>(mut self, storage: S) -> Board {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn power(&mut self) -> Result<&mut dyn PowerControl> {
        match self.power.as_deref_mut() {
            Some(power) => Ok(power),
            None => Err(Error::CapabilityNotFound("power")),
        }
    }

    pub fn storage(&mut self) -> Result<&mut dyn StorageControl> {
        match self.storage.as_deref_mut() {
            Some(storage) => Ok(storage),
            None => Err(Error::CapabilityNotFound("storage")),
        }
    }
}
