//! Shared LVM2 command-line plumbing used by both the CoW and Thin adapters.
//!
//! Isolated behind small functions so tests can assert on the argument vector
//! without invoking the real `lvm2` tooling, following
//! `ah-fs-snapshots-btrfs::execute_btrfs_command`'s pattern.

use std::process::{Command, Stdio};

use snapm_core::{Error, Result};

/// Environment variable LVM2 adapters' test harness uses to redirect LVM2's
/// configuration directory (spec §6).
pub const LVM_SYSTEM_DIR_ENV: &str = "LVM_SYSTEM_DIR";

pub fn lvm_command(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(dir) = std::env::var(LVM_SYSTEM_DIR_ENV) {
        cmd.env(LVM_SYSTEM_DIR_ENV, dir);
    }
    cmd
}

/// Run an LVM2 CLI command and return its trimmed stdout, or a `Callout`
/// error carrying stderr on non-zero exit.
pub fn run_lvm(program: &str, args: &[&str]) -> Result<String> {
    let output = lvm_command(program, args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::callout(format!("failed to spawn {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::callout(format!("{program} {args:?} failed: {stderr}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Build the `--reportformat json --units b --options ...` argument prefix
/// shared by `lvs`/`vgs` report invocations.
pub fn report_args<'a>(fields: &'a str) -> Vec<&'a str> {
    vec!["--reportformat", "json", "--units", "b", "--noheadings", "--options", fields]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_args_shape() {
        let args = report_args("lv_name,lv_size");
        assert_eq!(
            args,
            vec!["--reportformat", "json", "--units", "b", "--noheadings", "--options", "lv_name,lv_size"]
        );
    }
}
