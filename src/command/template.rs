//! Template wrapper: turns a raw snippet into a script with one entry point.

use super::types::Shape;

/// Name of the entry point every wrapped script defines.
pub const ENTRY_POINT: &str = "function";

const INDENT: &str = "    ";

/// Signature line opening the entry point for `shape`.
///
/// `function` is a reserved word, so the entry point is bound through the
/// script namespace instead of a named function statement.
pub fn header(shape: Shape) -> String {
    format!(
        "_ENV[\"{}\"] = function({})",
        ENTRY_POINT,
        shape.params().join(", ")
    )
}

/// Wrap `code` as the body of the entry point for `shape`.
///
/// Tabs become four spaces and every non-blank line is indented one level.
/// The snippet is not validated here; syntax errors surface at compile time.
pub fn indent(code: &str, shape: Shape) -> String {
    let mut out = header(shape);
    out.push('\n');

    for line in code.lines() {
        let line = line.replace('\t', INDENT);
        let line = line.trim_end();
        if !line.is_empty() {
            out.push_str(INDENT);
            out.push_str(line);
        }
        out.push('\n');
    }

    out.push_str("end\n");
    out
}
