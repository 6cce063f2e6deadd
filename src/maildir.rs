//! The Maildir walker: `new/` then `cur/` traversal, atomic rename with
//! mtime preservation, unlink, generated filenames.
//!
//! `renameat`/`unlinkat`/`utimensat`/`openat` operate relative to an open
//! directory descriptor rather than through ambient-path `fs::rename`, so
//! a rename can never race a concurrent rename of an unrelated file sharing
//! a path prefix (see DESIGN.md for why this wasn't simplified to
//! `std::fs::rename`).

use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use crate::config::Environment;
use crate::error::{MdsortError, Result};
use crate::message::Message;
use crate::path;

/// Which of `new/`/`cur/` is presently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdir {
    New,
    Cur,
}

impl Subdir {
    fn as_str(self) -> &'static str {
        match self {
            Subdir::New => "new",
            Subdir::Cur => "cur",
        }
    }

    fn parse(s: &str) -> Option<Subdir> {
        match s {
            "new" => Some(Subdir::New),
            "cur" => Some(Subdir::Cur),
            _ => None,
        }
    }

    fn next(self) -> Option<Subdir> {
        match self {
            Subdir::New => Some(Subdir::Cur),
            Subdir::Cur => None,
        }
    }
}

/// A Maildir handle: the root path, which subdir is active, and an open
/// directory descriptor for it. `walk` enables both `new/`→`cur/`
/// traversal; without it a single subdir is inferred from `path`'s last
/// component.
pub struct Maildir {
    root: PathBuf,
    subdir: Subdir,
    dir: *mut libc::DIR,
    walk: bool,
    /// Inodes already yielded this walk. A `move` from `new/` to `cur/`
    /// during one walk can otherwise surface the same message twice (the
    /// walk visits `new/` to completion, then `cur/`, where the moved file
    /// now also lives); deduplicating by inode instead of basename survives
    /// the rename changing the filename.
    seen_inodes: std::collections::HashSet<u64>,
}

fn open_dir(path: &Path) -> Result<*mut libc::DIR> {
    let path_c = cstr(path.as_os_str())?;
    let dirp = unsafe { libc::opendir(path_c.as_ptr()) };
    if dirp.is_null() {
        return Err(MdsortError::io_at(path, std::io::Error::last_os_error()));
    }
    Ok(dirp)
}

fn cstr(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|e| MdsortError::config(e.to_string()))
}

impl Drop for Maildir {
    fn drop(&mut self) {
        unsafe {
            libc::closedir(self.dir);
        }
    }
}

impl Maildir {
    /// Open `root` for walking both `new/` and `cur/`, starting at `new/`.
    pub fn open_walk(root: impl Into<PathBuf>) -> Result<Maildir> {
        let root = root.into();
        let dir_path = root.join(Subdir::New.as_str());
        let dir = open_dir(&dir_path)?;
        Ok(Maildir {
            root,
            subdir: Subdir::New,
            dir,
            walk: true,
            seen_inodes: std::collections::HashSet::new(),
        })
    }

    /// Open a single subdir inferred from `path`'s last path component
    /// (`"new"` or `"cur"`), as the executor does when opening a `move`
    /// destination.
    pub fn open_single(path: impl Into<PathBuf>) -> Result<Maildir> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MdsortError::config(format!("{}: subdir not found", path.display())))?;
        let subdir = Subdir::parse(name)
            .ok_or_else(|| MdsortError::config(format!("{}: subdir not found", path.display())))?;
        let root = path
            .parent()
            .ok_or_else(|| MdsortError::config(format!("{}: maildir root not found", path.display())))?
            .to_path_buf();
        let dir = open_dir(&path)?;
        Ok(Maildir {
            root,
            subdir,
            dir,
            walk: false,
            seen_inodes: std::collections::HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subdir(&self) -> &'static str {
        self.subdir.as_str()
    }

    fn current_path(&self) -> PathBuf {
        self.root.join(self.subdir.as_str())
    }

    fn fd(&self) -> RawFd {
        unsafe { libc::dirfd(self.dir) }
    }

    /// Advance to the next file, opening `cur/` once `new/` is exhausted.
    /// Returns `None` once both subdirs (or the single configured one) have
    /// been fully read. Only regular files are yielded.
    pub fn next_path(&mut self) -> Result<Option<PathBuf>> {
        loop {
            if let Some(name) = self.read_one() {
                if let Some(ino) = fstatat_ino(self.fd(), &name) {
                    if !self.seen_inodes.insert(ino) {
                        continue;
                    }
                }
                return Ok(Some(self.current_path().join(name)));
            }
            if !self.walk {
                return Ok(None);
            }
            match self.subdir.next() {
                Some(next) => {
                    self.subdir = next;
                    let new_dir = open_dir(&self.current_path())?;
                    unsafe {
                        libc::closedir(self.dir);
                    }
                    self.dir = new_dir;
                }
                None => return Ok(None),
            }
        }
    }

    /// Read the next regular-file entry from the currently open subdir,
    /// skipping `.`/`..` and anything not a regular file.
    fn read_one(&mut self) -> Option<String> {
        unsafe {
            loop {
                let ent = libc::readdir(self.dir);
                if ent.is_null() {
                    return None;
                }
                let d_type = (*ent).d_type;
                let name = CStr::from_ptr((*ent).d_name.as_ptr()).to_string_lossy().into_owned();
                if name == "." || name == ".." {
                    continue;
                }
                if d_type != libc::DT_REG && d_type != libc::DT_UNKNOWN {
                    continue;
                }
                if d_type == libc::DT_UNKNOWN && !self.current_path().join(&name).is_file() {
                    continue;
                }
                return Some(name);
            }
        }
    }

    /// Move `msg`'s file from `self` into `dst`, preserving mtime. The
    /// filename is regenerated: `new→cur` sets the `S` flag, `cur→new`
    /// clears it. Retries on `EEXIST` with an incremented counter to keep
    /// generated names unique under `O_CREAT|O_EXCL`.
    pub fn move_message(&self, dst: &mut Maildir, msg: &mut Message, env: &Environment) -> Result<PathBuf> {
        let src_name = msg
            .path()
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MdsortError::config(format!("{}: basename not found", msg.path().display())))?
            .to_string();

        if self.subdir == Subdir::New && dst.subdir == Subdir::Cur {
            msg.flags_mut().set('S').ok();
        } else if self.subdir == Subdir::Cur && dst.subdir == Subdir::New {
            msg.flags_mut().clear('S').ok();
        }

        let mtime = fstatat_mtime(self.fd(), &src_name);

        let dst_name = genname(dst, msg, env)?;

        renameat(self.fd(), &src_name, dst.fd(), &dst_name).map_err(|e| {
            MdsortError::io_at(self.current_path().join(&src_name), e)
        })?;

        if let Some(times) = mtime {
            let _ = utimensat(dst.fd(), &dst_name, times);
        }

        Ok(dst.current_path().join(&dst_name))
    }

    /// Unlink `msg`'s file from this Maildir.
    pub fn unlink_message(&self, msg: &Message) -> Result<()> {
        let name = msg
            .path()
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MdsortError::config(format!("{}: basename not found", msg.path().display())))?;
        unlinkat(self.fd(), name).map_err(|e| MdsortError::io_at(msg.path(), e))
    }
}

fn renameat(src_fd: RawFd, src_name: &str, dst_fd: RawFd, dst_name: &str) -> std::io::Result<()> {
    let src_c = CString::new(src_name).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let dst_c = CString::new(dst_name).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let ret = unsafe { libc::renameat(src_fd, src_c.as_ptr(), dst_fd, dst_c.as_ptr()) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn unlinkat(dir_fd: RawFd, name: &str) -> std::io::Result<()> {
    let name_c = CString::new(name).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let ret = unsafe { libc::unlinkat(dir_fd, name_c.as_ptr(), 0) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn fstatat_ino(dir_fd: RawFd, name: &str) -> Option<u64> {
    let name_c = CString::new(name).ok()?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::fstatat(dir_fd, name_c.as_ptr(), &mut st, 0) };
    if ret == -1 {
        return None;
    }
    Some(st.st_ino as u64)
}

fn fstatat_mtime(dir_fd: RawFd, name: &str) -> Option<libc::timespec> {
    let name_c = CString::new(name).ok()?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::fstatat(dir_fd, name_c.as_ptr(), &mut st, 0) };
    if ret == -1 {
        return None;
    }
    #[cfg(target_os = "macos")]
    let mtime = libc::timespec { tv_sec: st.st_mtime, tv_nsec: st.st_mtime_nsec };
    #[cfg(not(target_os = "macos"))]
    let mtime = st.st_mtim;
    Some(mtime)
}

/// Preserve mtime on the destination; `UTIME_OMIT` leaves atime untouched.
fn utimensat(dir_fd: RawFd, name: &str, mtime: libc::timespec) -> std::io::Result<()> {
    let name_c = CString::new(name).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let times = [
        libc::timespec { tv_sec: 0, tv_nsec: libc::UTIME_OMIT },
        mtime,
    ];
    let ret = unsafe { libc::utimensat(dir_fd, name_c.as_ptr(), times.as_ptr(), 0) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Generate a unique destination filename: `<unix-ts>.<pid>_<counter>.<hostname><:2,flags>`.
/// The counter is seeded with a random byte and incremented on `EEXIST`
/// via an `O_CREAT|O_EXCL` retry loop; other Maildir-aware tools expect
/// this exact timestamp-based naming, not a UUID.
fn genname(dst: &Maildir, msg: &Message, env: &Environment) -> Result<String> {
    let mut count: u32 = rand::random::<u8>() as u32 % 128;
    loop {
        count += 1;
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let name = format!(
            "{}.{}_{}.{}{}",
            ts,
            std::process::id(),
            count,
            env.hostname,
            msg.flags().suffix_str()
        );
        let name_c = cstr(OsStr::new(&name))?;
        let fd = unsafe {
            libc::openat(
                dst.fd(),
                name_c.as_ptr(),
                libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL,
                0o600,
            )
        };
        if fd == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                continue;
            }
            return Err(MdsortError::io_at(dst.current_path().join(&name), err));
        }
        unsafe {
            libc::close(fd);
        }
        return Ok(name);
    }
}

/// Derive the Maildir root from a message's absolute path, used when a
/// `move`/`flag` record's `maildir` is unspecified.
pub fn maildir_root_of(message_path: &str) -> Option<String> {
    path::slice(message_path, 0, -2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_maildir(root: &Path) {
        fs::create_dir_all(root.join("new")).unwrap();
        fs::create_dir_all(root.join("cur")).unwrap();
        fs::create_dir_all(root.join("tmp")).unwrap();
    }

    fn env() -> Environment {
        Environment::discover(PathBuf::from("/home/u"), "testhost".into(), None)
    }

    #[test]
    fn walk_visits_new_then_cur() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("M");
        make_maildir(&root);
        fs::write(root.join("new/1"), b"a").unwrap();
        fs::write(root.join("cur/2:2,S"), b"b").unwrap();

        let mut md = Maildir::open_walk(&root).unwrap();
        let mut seen = Vec::new();
        while let Some(p) = md.next_path().unwrap() {
            seen.push(p.file_name().unwrap().to_str().unwrap().to_string());
        }
        seen.sort();
        assert_eq!(seen, vec!["1", "2:2,S"]);
    }

    #[test]
    fn move_sets_seen_flag_new_to_cur() {
        let tmp = TempDir::new().unwrap();
        let src_root = tmp.path().join("A");
        let dst_root = tmp.path().join("B");
        make_maildir(&src_root);
        make_maildir(&dst_root);
        fs::write(src_root.join("new/1"), b"hello").unwrap();

        let src = Maildir::open_single(src_root.join("new")).unwrap();
        let mut dst = Maildir::open_single(dst_root.join("cur")).unwrap();
        let mut msg = Message::parse(src_root.join("new/1"), b"To: x\n\nhello").unwrap();

        let dest_path = src.move_message(&mut dst, &mut msg, &env()).unwrap();
        assert!(dest_path.to_str().unwrap().contains(":2,S"));
        assert!(!src_root.join("new/1").exists());
        assert_eq!(fs::read(&dest_path).unwrap(), b"hello");
    }

    #[test]
    fn move_clears_seen_flag_cur_to_new() {
        let tmp = TempDir::new().unwrap();
        let src_root = tmp.path().join("A");
        let dst_root = tmp.path().join("B");
        make_maildir(&src_root);
        make_maildir(&dst_root);
        fs::write(src_root.join("cur/1:2,S"), b"hi").unwrap();

        let src = Maildir::open_single(src_root.join("cur")).unwrap();
        let mut dst = Maildir::open_single(dst_root.join("new")).unwrap();
        let mut msg = Message::parse(src_root.join("cur/1:2,S"), b"To: x\n\nhi").unwrap();

        let dest_path = src.move_message(&mut dst, &mut msg, &env()).unwrap();
        assert!(!dest_path.to_str().unwrap().contains(":2,S"));
    }

    #[test]
    fn unlink_removes_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("M");
        make_maildir(&root);
        fs::write(root.join("new/1"), b"x").unwrap();
        let md = Maildir::open_single(root.join("new")).unwrap();
        let msg = Message::parse(root.join("new/1"), b"To: x\n\nx").unwrap();
        md.unlink_message(&msg).unwrap();
        assert!(!root.join("new/1").exists());
    }

    #[test]
    fn walk_does_not_revisit_a_message_moved_from_new_into_cur_mid_walk() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("M");
        make_maildir(&root);
        fs::write(root.join("new/1"), b"a").unwrap();

        let mut md = Maildir::open_walk(&root).unwrap();
        let first = md.next_path().unwrap().unwrap();
        assert_eq!(first.file_name().unwrap(), "1");

        // simulate the executor moving the just-read message from new/ to
        // cur/ before the walk advances into cur/ itself.
        let src = Maildir::open_single(root.join("new")).unwrap();
        let mut dst = Maildir::open_single(root.join("cur")).unwrap();
        let mut msg = Message::parse(first, b"To: x\n\na").unwrap();
        src.move_message(&mut dst, &mut msg, &env()).unwrap();

        assert_eq!(md.next_path().unwrap(), None);
    }

    #[test]
    fn maildir_root_of_strips_subdir_and_basename() {
        assert_eq!(
            maildir_root_of("/home/u/Maildir/INBOX/new/123").as_deref(),
            Some("/home/u/Maildir/INBOX")
        );
    }
}
