use serde::{Deserialize, Serialize};

/// Dialect flags that enable or disable language features for a file.
///
/// Loaded from JSON with missing fields taking their defaults:
///
/// ```json
/// { "allow_while": true, "allow_recursion": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    pub allow_float: bool,
    pub allow_set: bool,
    pub allow_lambda: bool,
    pub allow_nested_def: bool,
    pub allow_bitwise: bool,
    /// Permits `if`, `for` and `while` at the top level of a file.
    pub allow_toplevel_control: bool,
    pub allow_while: bool,
    pub allow_global_reassign: bool,
    pub allow_recursion: bool,
    /// Makes `load` bind module globals instead of file-local names.
    pub load_binds_globally: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            allow_float: true,
            allow_set: true,
            allow_lambda: true,
            allow_nested_def: true,
            allow_bitwise: true,
            allow_toplevel_control: true,
            allow_while: false,
            allow_global_reassign: false,
            allow_recursion: false,
            load_binds_globally: false,
        }
    }
}

impl FileOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Every feature enabled.
    pub fn permissive() -> Self {
        Self {
            allow_while: true,
            allow_global_reassign: true,
            allow_recursion: true,
            ..Self::default()
        }
    }
}
