//! Lookup of OS principals (users and groups) declared by service
//! descriptors. The supervisor only verifies principals exist; creating them
//! is the job of whatever provisioned the host.

use std::ffi::CString;
use std::path::Path;

/// Look up a user by name and return (uid, gid).
#[cfg(unix)]
pub fn lookup_user(username: &str) -> Option<(u32, u32)> {
    let c_username = CString::new(username).ok()?;

    // SAFETY: getpwnam is a standard POSIX function. We pass a valid C string.
    // The returned pointer is either null or points to a static buffer.
    unsafe {
        let pwd = libc::getpwnam(c_username.as_ptr());
        if pwd.is_null() {
            None
        } else {
            Some(((*pwd).pw_uid, (*pwd).pw_gid))
        }
    }
}

/// Look up a group by name and return its gid.
#[cfg(unix)]
pub fn lookup_group(groupname: &str) -> Option<u32> {
    let c_groupname = CString::new(groupname).ok()?;

    // SAFETY: as getpwnam above.
    unsafe {
        let grp = libc::getgrnam(c_groupname.as_ptr());
        if grp.is_null() {
            None
        } else {
            Some((*grp).gr_gid)
        }
    }
}

#[cfg(unix)]
pub fn user_exists(username: &str) -> bool {
    lookup_user(username).is_some()
}

#[cfg(unix)]
pub fn group_exists(groupname: &str) -> bool {
    lookup_group(groupname).is_some()
}

/// Assign ownership of a path to a named user (and that user's primary
/// group). Used by directory-preparation activate steps.
#[cfg(unix)]
pub fn chown_to_user(path: &Path, username: &str) -> std::io::Result<()> {
    let (uid, gid) = lookup_user(username).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("user not found: {}", username),
        )
    })?;

    nix::unistd::chown(
        path,
        Some(nix::unistd::Uid::from_raw(uid)),
        Some(nix::unistd::Gid::from_raw(gid)),
    )
    .map_err(std::io::Error::from)
}

#[cfg(test)]
mod tests;
