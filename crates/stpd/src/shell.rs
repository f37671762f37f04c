//! Shell command execution with safe quoting.
//!
//! The kernel bridge-port membership is driven through the `bridge`
//! utility; quoting keeps interface names from ever being interpreted by
//! the shell.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::{Result, StpdError};

/// Path to the `bridge` command for VLAN membership changes.
pub const BRIDGE_CMD: &str = "/sbin/bridge";

/// Path to the `bash` shell.
pub const BASH_CMD: &str = "/bin/bash";

/// Characters that need escaping inside shell double-quotes:
/// $, `, ", \, and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// ```
/// use stpd::shell::shellquote;
///
/// assert_eq!(shellquote("Ethernet0"), "\"Ethernet0\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Runs `cmd` through bash and returns an error on non-zero exit.
pub async fn exec(cmd: &str) -> Result<String> {
    let output = Command::new(BASH_CMD)
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(StpdError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            output: if stderr.is_empty() { stdout } else { stderr },
        });
    }

    Ok(stdout)
}
