//! Compute-macro invocation builder

use crate::core::{config::ComputeSettings, CommandSpec};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum MacroArg {
    Text(String),
    Int(i64),
}

/// A call like `src/modules/asymmetry.C("file.root","events",3)`.
///
/// The whole call is a single argument of the compute program, so it is
/// never re-split by a shell in local mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall {
    name: String,
    args: Vec<MacroArg>,
}

impl MacroCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a quoted string argument
    pub fn text(mut self, value: impl AsRef<str>) -> Self {
        self.args.push(MacroArg::Text(value.as_ref().to_string()));
        self
    }

    pub fn path(self, value: &Path) -> Self {
        self.text(value.to_string_lossy())
    }

    pub fn int(mut self, value: i64) -> Self {
        self.args.push(MacroArg::Int(value));
        self
    }

    /// `<macro_dir>/<name>.C(<args>)`
    pub fn render(&self, macro_dir: &str) -> String {
        let mut out = String::new();
        let dir = macro_dir.trim_end_matches('/');
        if !dir.is_empty() {
            out.push_str(dir);
            out.push('/');
        }
        out.push_str(&self.name);
        out.push_str(".C(");
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match arg {
                MacroArg::Text(value) => {
                    out.push('"');
                    out.push_str(&escape(value));
                    out.push('"');
                }
                MacroArg::Int(value) => {
                    let _ = write!(out, "{}", value);
                }
            }
        }
        out.push(')');
        out
    }

    /// `<program> <args...> <rendered call>`
    pub fn command(&self, compute: &ComputeSettings) -> CommandSpec {
        CommandSpec::new(compute.program.clone())
            .args(compute.args.iter().cloned())
            .arg(self.render(&compute.macro_dir))
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
