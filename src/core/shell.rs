//! Shell quoting for batch scripts and log lines
//!
//! Local execution never goes through a shell. Quoting is only needed when a
//! command vector is rendered into a bash batch script or echoed for humans.

/// Characters that force an argument into single quotes
const SHELL_META: &[char] = &[
    ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}', '<',
    '>', '|', '&', ';', '#', '~',
];

/// Quote a single argument so bash reads it back verbatim
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quote and join an argument vector
pub fn quote_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
