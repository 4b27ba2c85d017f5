//! Persisted record of the last successful regeneration.

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = ".rebuild-manifest.json";

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        FileTime::now().into()
    }

    pub fn modified(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(FileTime::from_last_modification_time(&metadata).into())
    }

    pub fn to_file_time(self) -> FileTime {
        FileTime::from_unix_time(self.seconds, self.nanos)
    }
}

impl From<FileTime> for Timestamp {
    fn from(time: FileTime) -> Self {
        Self {
            seconds: time.unix_seconds(),
            nanos: time.nanoseconds(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildManifest {
    pub package_enablement_snapshot: BTreeMap<String, bool>,
    pub last_regeneration_time: Timestamp,
    pub config_fingerprint: String,
    /// Every tracked input, sorted.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output file names written by the regeneration.
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed manifest {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RebuildManifest {
    pub fn path_in(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILE)
    }

    /// Read the manifest from an output directory; `Ok(None)` if there is none.
    pub fn read(output_dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = Self::path_in(output_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ManifestError::Json { path, source })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> RebuildManifest {
        RebuildManifest {
            package_enablement_snapshot: BTreeMap::from([
                ("A".to_string(), true),
                ("B".to_string(), false),
            ]),
            last_regeneration_time: Timestamp {
                seconds: 1_700_000_000,
                nanos: 5,
            },
            config_fingerprint: "00ff".to_string(),
            inputs: vec!["scripts/a.txt".to_string()],
            outputs: vec!["patched_a.txt".to_string()],
        }
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RebuildManifest::read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_written_manifest_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let original = manifest();
        fs::write(
            RebuildManifest::path_in(dir.path()),
            original.to_json().unwrap(),
        )
        .unwrap();

        assert_eq!(RebuildManifest::read(dir.path()).unwrap(), Some(original));
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(RebuildManifest::path_in(dir.path()), "{ nope").unwrap();
        assert!(matches!(
            RebuildManifest::read(dir.path()),
            Err(ManifestError::Json { .. })
        ));
    }

    #[test]
    fn test_timestamp_ordering() {
        let earlier = Timestamp { seconds: 10, nanos: 999 };
        let later = Timestamp { seconds: 11, nanos: 0 };
        assert!(later > earlier);
        assert_eq!(Timestamp::from(later.to_file_time()), later);
    }
}
