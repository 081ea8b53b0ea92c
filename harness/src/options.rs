use std::env;

pub enum ConsoleKind {
    Serial,
    Process,
    Remote,
}

pub struct Options {
    pub console: ConsoleKind,
    pub serial_port: String,
    pub baud_rate: u32,
    pub console_command: String,
    pub prompt: Option<String>,
    pub timeout_ticks: u32,
    pub login_username: Option<String>,
    pub login_password: Option<String>,
    pub iterations: u32,
    pub run_forever: bool,
    pub report_every: Option<u32>,
    pub report_path: String,
    pub power_on_command: Option<String>,
    pub power_off_command: Option<String>,
    pub storage_to_host_command: Option<String>,
    pub storage_to_board_command: Option<String>,
}

impl Options {
    pub fn parse() -> Self {
        let console = env::var("HIL_CONSOLE")
            .map(|v| match v.as_ref() {
                "serial" => ConsoleKind::Serial,
                "process" => ConsoleKind::Process,
                "remote" => ConsoleKind::Remote,
                _ => panic!("HIL_CONSOLE must be 'serial', 'process' or 'remote'"),
            })
            .unwrap_or(ConsoleKind::Serial);

        let serial_port = env::var("HIL_SERIAL_PORT").unwrap_or("/dev/ttyUSB0".to_string());

        let baud_rate = env::var("HIL_BAUD_RATE")
            .map(|v| v.parse::<u32>().unwrap())
            .unwrap_or(115200);

        let console_command = env::var("HIL_CONSOLE_COMMAND").unwrap_or("sh -i".to_string());

        let prompt = env::var("HIL_PROMPT").ok();

        let timeout_ticks = env::var("HIL_TIMEOUT_TICKS")
            .map(|v| v.parse::<u32>().unwrap())
            .unwrap_or(100);

        let login_username = env::var("HIL_LOGIN_USERNAME").ok();
        let login_password = env::var("HIL_LOGIN_PASSWORD").ok();

        let iterations = env::var("HIL_ITERATIONS")
            .map(|v| v.parse::<u32>().unwrap())
            .unwrap_or(1);

        let run_forever = env::var("HIL_FOREVER").map(|v| v == "1").unwrap_or(false);

        let report_every = env::var("HIL_REPORT_EVERY")
            .map(|v| v.parse::<u32>().unwrap())
            .ok();

        let report_path = env::var("HIL_REPORT_PATH").unwrap_or("suite_report.json".to_string());

        let power_on_command = env::var("HIL_POWER_ON_COMMAND").ok();
        let power_off_command = env::var("HIL_POWER_OFF_COMMAND").ok();
        let storage_to_host_command = env::var("HIL_STORAGE_TO_HOST_COMMAND").ok();
        let storage_to_board_command = env::var("HIL_STORAGE_TO_BOARD_COMMAND").ok();

        Self {
            console,
            serial_port,
            baud_rate,
            console_command,
            prompt,
            timeout_ticks,
            login_username,
            login_password,
            iterations,
            run_forever,
            report_every,
            report_path,
            power_on_command,
            power_off_command,
            storage_to_host_command,
            storage_to_board_command,
        }
    }
}
