use anyhow::{bail, Result};
use std::fs;
use std::path::Path;

const SELINUX_ENFORCE: &str = "/sys/fs/selinux/enforce";

/// Container bind mounts are refused while SELinux enforces, so runs are
/// not attempted in that mode.
pub fn check_security_mode() -> Result<()> {
    check_enforce_file(Path::new(SELINUX_ENFORCE))
}

fn check_enforce_file(path: &Path) -> Result<()> {
    match fs::read_to_string(path) {
        Ok(mode) if mode.trim() == "1" => {
            bail!("SELinux is in enforcing mode; switch it to permissive before running cases")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::temp_root;

    #[test]
    fn enforcing_mode_is_rejected() {
        let root = temp_root("security");
        let path = root.join("enforce");
        fs::write(&path, "1\n").expect("write");
        assert!(check_enforce_file(&path).is_err());
        fs::write(&path, "0\n").expect("write");
        assert!(check_enforce_file(&path).is_ok());
        assert!(check_enforce_file(&root.join("absent")).is_ok());
        let _ = fs::remove_dir_all(root);
    }
}
