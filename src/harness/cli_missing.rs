static CLI_MISSING_PATTERNS: &[&str] = &[
    "not installed",
    "command not found",
    "no such file or directory",
    "is not recognized as an internal or external command",
];

pub const CLI_MISSING_CODE: &str = "CLI_MISSING";
pub const SPAWN_FAILED_CODE: &str = "SPAWN_FAILED";

pub fn is_cli_missing_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    CLI_MISSING_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Machine code for a failed launch of the CLI executable.
pub fn spawn_failure_code(error: &std::io::Error) -> &'static str {
    if error.kind() == std::io::ErrorKind::NotFound || is_cli_missing_line(&error.to_string()) {
        CLI_MISSING_CODE
    } else {
        SPAWN_FAILED_CODE
    }
}
