use std::borrow::Cow;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Path with a separator (absolute, `./foo`, `bin/sh`): used as given if it is
///   an executable file; the search path is not consulted.
/// - Single path component: search each directory in `search_paths` (PATH) in
///   order and return the first executable match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    let name = path.as_os_str();
    if name.is_empty() {
        return None;
    }
    if name.as_encoded_bytes().contains(&b'/') {
        return find_by_path(path).map(Cow::Borrowed);
    }
    find_in_path(search_paths, name).map(Cow::Owned)
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        // an empty PATH entry means the current directory
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn touch(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").expect("write fixture");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        path
    }

    fn join_paths(dirs: &[&Path]) -> OsString {
        std::env::join_paths(dirs).expect("join paths")
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(osstr("/nowhere"), path);
        assert!(res.is_some(), "Expected to find /bin/sh via absolute path");
        assert_eq!(&*res.unwrap(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), path);
        assert!(res.is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = touch(dir.path(), "tool", 0o755);

        let found = find_command_path(&join_paths(&[dir.path()]), Path::new("tool"))
            .expect("Expected to find 'tool' via PATH search");
        assert_eq!(&*found, exe);
    }

    #[test]
    fn single_component_not_found_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let res = find_command_path(&join_paths(&[dir.path()]), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn first_directory_with_a_match_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let third = tempfile::tempdir().unwrap();
        let expected = touch(second.path(), "tool", 0o755);
        touch(third.path(), "tool", 0o755);

        let paths = join_paths(&[first.path(), second.path(), third.path()]);
        let found = find_command_path(&paths, Path::new("tool")).unwrap();
        assert_eq!(&*found, expected);
    }

    #[test]
    fn non_executable_candidates_are_skipped() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        touch(first.path(), "tool", 0o644);
        let expected = touch(second.path(), "tool", 0o700);

        let paths = join_paths(&[first.path(), second.path()]);
        let found = find_command_path(&paths, Path::new("tool")).unwrap();
        assert_eq!(&*found, expected);
    }

    #[test]
    fn directories_are_not_commands() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tool")).unwrap();
        let res = find_command_path(&join_paths(&[dir.path()]), Path::new("tool"));
        assert!(res.is_none());
    }

    #[test]
    fn path_with_separator_bypasses_search() {
        let dir = tempfile::tempdir().unwrap();
        let exe = touch(dir.path(), "tool", 0o755);
        let other = tempfile::tempdir().unwrap();
        touch(other.path(), "tool", 0o755);

        let found = find_command_path(&join_paths(&[other.path()]), &exe).unwrap();
        assert_eq!(&*found, exe);
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }
}
