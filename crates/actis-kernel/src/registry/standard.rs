//! The standard capability table.
//!
//! Mirrors the built-in tool implementations registered by
//! `tools::builtin::register_builtins`.

use super::{ArgShape, Signature, SideEffect};

pub(super) fn table() -> Vec<Signature> {
    use ArgShape::*;
    use SideEffect::*;

    vec![
        // Console
        Signature::new("print", Io)
            .variadic()
            .keyword("sep", Str)
            .keyword("end", Str)
            .describe("Write values to stdout"),
        // Pure helpers
        Signature::new("len", Pure).param("obj", Any).describe("Length of a str, list, tuple or dict"),
        Signature::new("str", Pure).optional("value", Any),
        Signature::new("repr", Pure).param("value", Any),
        Signature::new("int", Pure).optional("value", Any),
        Signature::new("float", Pure).optional("value", Any),
        Signature::new("bool", Pure).optional("value", Any),
        Signature::new("list", Pure).optional("iterable", Any),
        Signature::new("dict", Pure).optional("mapping", Any),
        Signature::new("range", Pure)
            .param("start", Int)
            .optional("stop", Int)
            .optional("step", Int),
        Signature::new("sorted", Pure).param("iterable", Any).keyword("reverse", Bool),
        Signature::new("reversed", Pure).param("sequence", Any),
        Signature::new("min", Pure).param("first", Any).variadic(),
        Signature::new("max", Pure).param("first", Any).variadic(),
        Signature::new("sum", Pure).param("iterable", Any).optional("start", Number),
        Signature::new("abs", Pure).param("x", Number),
        Signature::new("round", Pure).param("x", Number).optional("ndigits", Int),
        Signature::new("enumerate", Pure).param("iterable", Any).optional("start", Int),
        Signature::new("zip", Pure).variadic(),
        Signature::new("type_name", Pure).param("value", Any).describe("Name of a value's type"),
        // Filesystem
        Signature::new("read_files", Io)
            .param("paths", List)
            .describe("Read files and return a dict of path to content or error text"),
        Signature::new("write_file", Io)
            .param("path", Str)
            .param("content", Str)
            .describe("Write text to a file"),
        Signature::new("list_files", Io)
            .optional("path", Str)
            .describe("List entries of a directory"),
        // Network
        Signature::new("http_get", Io)
            .param("url", Str)
            .describe("Fetch a URL and return its status and body"),
        // Turn control
        Signature::new("respond", Stateful)
            .param("message", Str)
            .terminal()
            .describe("Reply to the user and end the turn"),
        Signature::new("continue_turn", Stateful)
            .terminal()
            .describe("End this script and keep working in a new step"),
        Signature::new("reflect", Io)
            .param("analysis", Str)
            .describe("Record a reflection on the previous step"),
        // Never available to scripts
        Signature::forbidden("eval"),
        Signature::forbidden("exec"),
        Signature::forbidden("open"),
        Signature::forbidden("compile"),
        Signature::forbidden("__import__"),
        Signature::forbidden("globals"),
        Signature::forbidden("locals"),
        Signature::forbidden("getattr"),
        Signature::forbidden("setattr"),
        Signature::forbidden("input"),
    ]
}
