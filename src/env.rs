use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::{CString, OsString};
use std::path::PathBuf;

/// Variable holding the colon-delimited executable search path.
pub const PATH_KEY: &str = "PATH";

/// Variable read by `sysinfo` for the user name.
pub const USER_KEY: &str = "USER";

/// Variable naming the base directory for chat rooms.
pub const CHAT_DIR_KEY: &str = "SHELLISH_CHAT_DIR";

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: a flag that a REPL loop can check to know when to terminate.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`. The `should_exit` flag is initialized to `false`.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The executable search path; empty when PATH is unset.
    pub fn search_path(&self) -> OsString {
        self.get_var(PATH_KEY).map(OsString::from).unwrap_or_default()
    }

    /// Base directory for chat rooms.
    pub fn chat_dir(&self) -> PathBuf {
        self.get_var(CHAT_DIR_KEY)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(stdenv::temp_dir)
    }

    /// `KEY=VALUE` strings for `execve`. Entries containing NUL are skipped.
    pub fn to_envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::*;

    fn empty_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            should_exit: false,
        }
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = empty_env();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_search_path_defaults_to_empty() {
        let mut env = empty_env();
        assert!(env.search_path().is_empty());
        env.set_var(PATH_KEY, "/a:/b");
        assert_eq!(env.search_path(), OsString::from("/a:/b"));
    }

    #[test]
    fn test_chat_dir_falls_back_to_temp_dir() {
        let mut env = empty_env();
        assert_eq!(env.chat_dir(), stdenv::temp_dir());
        env.set_var(CHAT_DIR_KEY, "/srv/chat");
        assert_eq!(env.chat_dir(), PathBuf::from("/srv/chat"));
    }

    #[test]
    fn test_envp_entries() {
        let mut env = empty_env();
        env.set_var("A", "1");
        env.set_var("B", "two words");
        let mut envp: Vec<String> = env
            .to_envp()
            .into_iter()
            .map(|c| c.into_string().unwrap())
            .collect();
        envp.sort();
        assert_eq!(envp, vec!["A=1".to_string(), "B=two words".to_string()]);
    }
}
