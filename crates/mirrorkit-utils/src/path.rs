use std::{env, path::PathBuf};

use nix::unistd::{getuid, User};

/// Returns the user's home directory.
///
/// Falls back to the passwd entry when `$HOME` is unset.
pub fn home_dir() -> PathBuf {
    env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| {
        User::from_uid(getuid())
            .ok()
            .flatten()
            .map(|user| user.dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    })
}

/// Returns `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns `$XDG_DATA_HOME`, defaulting to `$HOME/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some("") => home_dir(),
        Some(rest) if rest.starts_with('/') => home_dir().join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_xdg_dirs_follow_env() {
        env::set_var("XDG_CONFIG_HOME", "/tmp/mk-config");
        env::set_var("XDG_DATA_HOME", "/tmp/mk-data");
        assert_eq!(xdg_config_home(), PathBuf::from("/tmp/mk-config"));
        assert_eq!(xdg_data_home(), PathBuf::from("/tmp/mk-data"));
        env::remove_var("XDG_CONFIG_HOME");
        env::remove_var("XDG_DATA_HOME");
    }

    #[test]
    #[serial]
    fn test_xdg_dirs_default_to_home() {
        env::remove_var("XDG_DATA_HOME");
        env::set_var("HOME", "/home/mirror");
        assert_eq!(xdg_data_home(), PathBuf::from("/home/mirror/.local/share"));
    }

    #[test]
    #[serial]
    fn test_expand_tilde() {
        env::set_var("HOME", "/home/mirror");
        assert_eq!(expand_tilde("~"), PathBuf::from("/home/mirror"));
        assert_eq!(
            expand_tilde("~/keys/a.pub"),
            PathBuf::from("/home/mirror/keys/a.pub")
        );
        assert_eq!(expand_tilde("/etc/keys"), PathBuf::from("/etc/keys"));
        assert_eq!(expand_tilde("~other"), PathBuf::from("~other"));
    }
}
