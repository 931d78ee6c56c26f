//! Resolution of the non-root account supervised processes run as.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::GateError;

/// System account database.
const PASSWD_PATH: &str = "/etc/passwd";

/// A resolved Unix account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Login name (the numeric uid when the account has no entry).
    pub name: String,
    /// User id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// Home directory.
    pub home: PathBuf,
}

impl Identity {
    /// Resolves `spec` against `/etc/passwd`.
    ///
    /// `spec` is a login name, a numeric `uid` or `uid:gid`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::UnknownUser`] when a name has no passwd entry
    /// or a numeric spec does not parse, and [`GateError::UserDatabase`]
    /// when the file exists but cannot be read.
    pub fn resolve(spec: &str) -> Result<Self, GateError> {
        Self::resolve_from(spec, Path::new(PASSWD_PATH))
    }

    /// Resolves `spec` against the passwd file at `path`. A missing file
    /// counts as an empty database, so numeric specs still resolve.
    ///
    /// # Errors
    ///
    /// See [`Identity::resolve`].
    pub fn resolve_from(spec: &str, path: &Path) -> Result<Self, GateError> {
        let passwd = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "user database missing");
                String::new()
            }
            Err(source) => {
                return Err(GateError::UserDatabase {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::resolve_with(spec, &passwd)
    }

    /// Resolves `spec` against the given passwd file contents.
    ///
    /// # Errors
    ///
    /// See [`Identity::resolve`].
    pub fn resolve_with(spec: &str, passwd: &str) -> Result<Self, GateError> {
        let spec = spec.trim();
        let entries = || passwd.lines().filter_map(parse_passwd_line);

        if let Some(found) = entries().find(|entry| entry.name == spec) {
            return Ok(found);
        }

        let unknown = || GateError::UnknownUser(spec.to_string());
        let (uid_part, gid_part) = match spec.split_once(':') {
            Some((uid, gid)) => (uid, Some(gid)),
            None => (spec, None),
        };
        let uid: u32 = uid_part.parse().map_err(|_| unknown())?;
        let known = entries().find(|entry| entry.uid == uid);
        let gid = match gid_part {
            Some(gid) => gid.parse().map_err(|_| unknown())?,
            None => known.as_ref().map_or(uid, |entry| entry.gid),
        };

        Ok(match known {
            Some(entry) => Self { gid, ..entry },
            None => Self {
                name: uid.to_string(),
                uid,
                gid,
                home: PathBuf::from("/"),
            },
        })
    }
}

/// Parses `name:password:uid:gid:gecos:home:shell`.
fn parse_passwd_line(line: &str) -> Option<Identity> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut fields = line.split(':');
    let name = fields.next()?;
    let _password = fields.next()?;
    let uid = fields.next()?.parse().ok()?;
    let gid = fields.next()?.parse().ok()?;
    let _gecos = fields.next()?;
    let home = fields.next()?;
    Some(Identity {
        name: name.to_string(),
        uid,
        gid,
        home: PathBuf::from(home),
    })
}
