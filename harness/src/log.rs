use colored::Colorize;

/// Stage-scoped logger. Every component that logs owns its own instance or
/// borrows one; there is no process-wide logger, so suites and sessions can
/// be logged in isolation.
pub struct LogCtx {
    stages: Vec<String>,
}

impl LogCtx {
    pub fn new() -> LogCtx {
        LogCtx { stages: vec![] }
    }

    fn line(&self, tag: colored::ColoredString, msg: colored::ColoredString) {
        if self.stages.is_empty() {
            println!("{: <5} {}", tag, msg);
        } else {
            let path = self.stages.join("/").bright_black();
            println!("{: <5} {} {}", tag, path, msg);
        }
    }

    pub fn enter(&mut self, stage: &str) {
        self.line(">>".green(), stage.white());
        self.stages.push(stage.to_string());
    }

    pub fn leave(&mut self) {
        if let Some(stage) = self.stages.pop() {
            self.line("<<".red(), stage.white());
        }
    }

    pub fn info(&self, msg: &str) {
        self.line("INFO".green(), msg.bright_white());
    }

    pub fn success(&self, msg: &str) {
        self.line("OK".bright_green(), msg.green());
    }

    pub fn warn(&self, msg: &str) {
        self.line("WARN".yellow(), msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        self.line("ERROR".red(), msg.red());
    }

    pub fn fatal(&self, msg: &str) {
        self.line("FATAL".bright_red(), msg.bright_red());
    }

    pub fn debug(&self, msg: &str) {
        self.line("DEBUG".bright_black(), msg.bright_black());
    }
}
