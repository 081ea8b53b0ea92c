use std::{
    fs::File,
    io::{self, Write},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{test_runner::SuiteStats, Result};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestReportValue {
    pub step: String,
    pub condition: String,
    pub value: String,
    pub logs: Option<String>,
    pub failed: bool,
    #[serde(rename = "startedAt")]
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "endedAt")]
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

impl TestReportValue {
    pub fn new(
        step: impl ToString,
        condition: impl ToString,
        value: impl ToString,
        logs: Option<impl ToString>,
        failed: bool,
        started_at: chrono::DateTime<chrono::Utc>,
        ended_at: chrono::DateTime<chrono::Utc>,
    ) -> TestReportValue {
        TestReportValue {
            step: step.to_string(),
            condition: condition.to_string(),
            value: value.to_string(),
            logs: logs.map(|x| x.to_string()),
            failed,
            started_at,
            ended_at,
        }
    }
}

/// Suite run summary persisted as JSON. Uploading it anywhere is someone
/// else's job; the harness only writes the file.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SuiteReport {
    pub id: String,
    pub suite: String,
    pub hostname: String,
    pub stats: SuiteStats,
    pub values: Vec<TestReportValue>,
    #[serde(rename = "startedAt")]
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "endedAt")]
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

impl SuiteReport {
    pub fn new(suite: &str) -> SuiteReport {
        SuiteReport {
            id: Uuid::new_v4().to_string(),
            suite: suite.to_string(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            stats: SuiteStats::default(),
            values: Vec::new(),
            started_at: chrono::Utc::now(),
            ended_at: chrono::DateTime::<chrono::Utc>::MIN_UTC,
        }
    }

    pub fn add_value(&mut self, value: TestReportValue) {
        self.values.push(value);
    }

    pub fn finish(&mut self, stats: SuiteStats) {
        self.stats = stats;
        self.ended_at = chrono::Utc::now();
    }

    pub fn write_json(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::from)?;

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}
