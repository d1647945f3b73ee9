//! PowerShell host invocation: startup flags and exit-status normalization.
//!
//! Unless a script calls `exit` explicitly, `powershell.exe` reports only 0 or
//! 1. The normalization wrapper surfaces the exit code of the last external
//! process instead, using the `$?` and `$LASTEXITCODE` automatic variables.

/// Host executable for PowerShell resources and guards.
pub const POWERSHELL_EXECUTABLE: &str = "powershell.exe";

const EXIT_STATUS_RESET_SCRIPT: &str = "$LASTEXITCODE=0\n";
const EXIT_STATUS_NORMALIZATION_SCRIPT: &str = "\nif ($? -eq $true) {exit 0} elseif ( $LASTEXITCODE -ne 0) {exit $LASTEXITCODE} else { exit 1 }";

/// Startup flags for a non-interactive, profile-free host run.
///
/// Order matters: `-Command` must come last so the script text follows it.
pub fn build_invocation_flags() -> Vec<&'static str> {
    vec![
        "-NoLogo",
        "-NonInteractive",
        "-NoProfile",
        "-ExecutionPolicy RemoteSigned",
        // The host hangs when stdin is redirected and no input is expected.
        "-InputFormat None",
        "-Command",
    ]
}

/// Flags joined into the single string form used on a command line.
pub fn invocation_flags() -> String {
    build_invocation_flags().join(" ")
}

/// Wrap `code` so the host exits with the real exit status of the script.
///
/// Returns `None` when there is no code to wrap.
pub fn normalize_exit_status(code: Option<&str>) -> Option<String> {
    code.map(|code| format!("{EXIT_STATUS_RESET_SCRIPT}{code}{EXIT_STATUS_NORMALIZATION_SCRIPT}"))
}

/// Command line that runs a guard command under the host.
pub fn guard_command(command: &str) -> String {
    format!("{POWERSHELL_EXECUTABLE} {} {command}", invocation_flags())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_ordered_with_command_last() {
        let flags = build_invocation_flags();
        assert_eq!(flags.first(), Some(&"-NoLogo"));
        assert_eq!(flags.last(), Some(&"-Command"));
        assert!(flags.contains(&"-InputFormat None"));
        assert!(flags.contains(&"-ExecutionPolicy RemoteSigned"));
    }

    #[test]
    fn normalize_none_is_none() {
        assert_eq!(normalize_exit_status(None), None);
    }

    #[test]
    fn normalize_wraps_code_with_reset_and_branches() {
        let script = normalize_exit_status(Some("foo")).expect("wrapped");
        let reset = script.find("$LASTEXITCODE=0").expect("reset");
        let code = script.find("\nfoo\n").expect("command");
        assert!(reset < code);
        assert!(script.contains("if ($? -eq $true) {exit 0}"));
        assert!(script.contains("elseif ( $LASTEXITCODE -ne 0) {exit $LASTEXITCODE}"));
        assert!(script.ends_with("else { exit 1 }"));
    }

    #[test]
    fn guard_command_prefixes_host_and_flags() {
        assert_eq!(
            guard_command("Test-Path C:\\x"),
            "powershell.exe -NoLogo -NonInteractive -NoProfile -ExecutionPolicy RemoteSigned \
             -InputFormat None -Command Test-Path C:\\x"
        );
    }
}
