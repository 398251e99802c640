//! Workspace switching for the alternate-modifier scroll gesture.

use std::process::{Command, Stdio};

use anyhow::{bail, Context};
use tracing::warn;

/// Called from the input path: one query per switch, and `activate` must not
/// wait for the switch to finish.
pub trait WorkspaceSwitcher: Send + Sync {
    /// Number of workspaces and the index of the active one, in one query.
    fn layout(&self) -> anyhow::Result<(usize, usize)>;

    fn activate(&self, index: usize) -> anyhow::Result<()>;

    fn count(&self) -> anyhow::Result<usize> {
        Ok(self.layout()?.0)
    }
}

/// EWMH workspaces through the `wmctrl` tool.
pub struct WmctrlWorkspaces {
    binary: String,
}

impl WmctrlWorkspaces {
    pub fn new() -> Self {
        Self {
            binary: "wmctrl".into(),
        }
    }

    fn desktops(&self) -> anyhow::Result<Vec<Desktop>> {
        let output = Command::new(&self.binary)
            .arg("-d")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} -d failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(parse_desktops(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for WmctrlWorkspaces {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceSwitcher for WmctrlWorkspaces {
    fn layout(&self) -> anyhow::Result<(usize, usize)> {
        let desktops = self.desktops()?;
        let active = desktops
            .iter()
            .find(|d| d.active)
            .map(|d| d.index)
            .context("wmctrl reported no active workspace")?;
        Ok((desktops.len(), active))
    }

    fn activate(&self, index: usize) -> anyhow::Result<()> {
        // stdout carries IPC events
        let mut child = Command::new(&self.binary)
            .arg("-s")
            .arg(index.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.binary))?;
        let binary = self.binary.clone();
        std::thread::spawn(move || match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(index, %status, "{} -s failed", binary),
            Err(e) => warn!(index, error = %e, "{} -s failed", binary),
        });
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Desktop {
    index: usize,
    active: bool,
}

/// Parse `wmctrl -d` lines such as `0  * DG: 1920x1080  VP: 0,0 ... Workspace 1`.
fn parse_desktops(output: &str) -> Vec<Desktop> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let index = fields.next()?.parse().ok()?;
            let active = fields.next()? == "*";
            Some(Desktop { index, active })
        })
        .collect()
}
