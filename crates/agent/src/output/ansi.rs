//! Terminal control sequence removal.

use regex_lite::Regex;
use std::sync::LazyLock;

/// CSI and OSC sequences introduced by `ESC` or the 8-bit `CSI` byte.
static ANSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x1b\x{9b}][\[\]()#;?]*(?:(?:(?:(?:;[-a-zA-Z\d/#&.:=?%@~_]+)*|[a-zA-Z\d]+(?:;[-a-zA-Z\d/#&.:=?%@~_]*)*)?\x07)|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PR-TZcf-nq-uy=><~]))",
    )
    .expect("ANSI pattern is valid")
});

/// Remove terminal escape sequences from `text`.
pub fn strip_ansi(text: &str) -> String {
    ANSI.replace_all(text, "").into_owned()
}
