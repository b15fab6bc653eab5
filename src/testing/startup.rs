//! Startup validation check
//!
//! Launches the server with its API key blanked out and expects it to
//! refuse to start: exit status 1 and an explanatory stderr line.

use std::process::ExitStatus;
use std::time::Duration;

use crate::common::Result;
use crate::rpc::{LaunchSpec, Transport};

/// Expected server behaviour when the API key is missing
#[derive(Debug, Clone)]
pub struct StartupCheck {
    /// Environment variable blanked for the launch
    pub key_var: String,
    /// Exit code the server must report
    pub expected_code: i32,
    /// Substring the server must print to stderr
    pub expected_message: String,
    /// How long to wait for the server to exit
    pub deadline: Duration,
}

impl Default for StartupCheck {
    fn default() -> Self {
        Self {
            key_var: "RATESPOT_API_KEY".to_string(),
            expected_code: 1,
            expected_message: "RATESPOT_API_KEY environment variable is required".to_string(),
            deadline: Duration::from_secs(5),
        }
    }
}

/// Result of the startup check
#[derive(Debug)]
pub enum StartupVerdict {
    /// The server rejected the missing key as expected
    Passed,
    /// The server exited, but not the way it should have
    UnexpectedExit {
        status: ExitStatus,
        stderr: Vec<String>,
    },
    /// The server was still running at the deadline
    TimedOut { stderr: Vec<String> },
}

impl StartupVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, StartupVerdict::Passed)
    }
}

impl StartupCheck {
    /// Launch the server with the key blanked and judge how it exits
    pub async fn run(&self, spec: &LaunchSpec) -> Result<StartupVerdict> {
        let spec = spec
            .clone()
            .env(&self.key_var, "")
            .startup_grace(Duration::ZERO);

        let mut transport = Transport::start(&spec).await?;
        let exited = transport.wait_for_exit(self.deadline).await?;
        let stderr = transport.stderr_tail();

        let verdict = match exited {
            None => {
                tracing::warn!("Server still running after {:?}", self.deadline);
                StartupVerdict::TimedOut { stderr }
            }
            Some(status)
                if status.code() == Some(self.expected_code)
                    && stderr.iter().any(|l| l.contains(&self.expected_message)) =>
            {
                StartupVerdict::Passed
            }
            Some(status) => StartupVerdict::UnexpectedExit { status, stderr },
        };

        transport.stop().await?;
        Ok(verdict)
    }
}
