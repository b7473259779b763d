use std::fmt;
use std::fs::File;
use std::hash::Hasher;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use twox_hash::XxHash64;

const BLOCK: u64 = 64 * 1024;

/// Identity of a corpus file snapshot: byte length plus an xxHash64 of its
/// first and last blocks.
///
/// Offsets in an index are only meaningful against a file with the same
/// fingerprint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Fingerprint {
    pub len: u64,
    pub digest: u64,
}

impl Fingerprint {
    pub fn of_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut hasher = XxHash64::with_seed(0);
        let mut buf = Vec::with_capacity(BLOCK as usize);

        (&mut file).take(BLOCK).read_to_end(&mut buf)?;
        hasher.write(&buf);

        if len > BLOCK {
            buf.clear();
            let tail_start = BLOCK.max(len - BLOCK);
            file.seek(SeekFrom::Start(tail_start))?;
            file.take(BLOCK).read_to_end(&mut buf)?;
            hasher.write(&buf);
        }

        Ok(Self {
            len,
            digest: hasher.finish(),
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.len, self.digest)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (len, digest) = s
            .split_once(':')
            .ok_or_else(|| format!("fingerprint {s:?} lacks ':'"))?;
        Ok(Self {
            len: len.parse().map_err(|e| format!("fingerprint length: {e}"))?,
            digest: u64::from_str_radix(digest, 16)
                .map_err(|e| format!("fingerprint digest: {e}"))?,
        })
    }
}
