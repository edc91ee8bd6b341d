use std::fs::{File, Metadata};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Identifies the underlying file behind a path, independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    // No stable file index off unix; the creation time is the closest stand-in.
    #[cfg(not(unix))]
    pub fn of(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        Self { dev: 0, ino: created }
    }
}

/// A complete line read from the cursor but not yet consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLine {
    /// Zero-based ordinal within the open file.
    pub index: u64,
    pub text: String,
    len: u64,
}

/// Read position within one open log file.
///
/// `offset` always sits at the start of a line and `next_index` is that
/// line's ordinal. Both only move forward through [`FileCursor::consume`].
#[derive(Debug)]
pub struct FileCursor {
    reader: BufReader<File>,
    identity: FileIdentity,
    offset: u64,
    next_index: u64,
    read_pos: u64,
}

impl FileCursor {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let identity = FileIdentity::of(&file.metadata()?);

        Ok(Self {
            reader: BufReader::new(file),
            identity,
            offset: 0,
            next_index: 0,
            read_pos: 0,
        })
    }

    pub fn identity(&self) -> FileIdentity {
        self.identity
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Current length of the open file (which may no longer be at the watched path).
    pub fn file_len(&self) -> io::Result<u64> {
        Ok(self.reader.get_ref().metadata()?.len())
    }

    /// Whether bytes exist past the consumed position.
    pub fn has_unread(&self) -> io::Result<bool> {
        Ok(self.file_len()? > self.offset)
    }

    /// Read the next newline-terminated line.
    ///
    /// Returns `None` at end of file or when only a partial line has been
    /// written so far. Calling this again without [`consume`](Self::consume)
    /// re-reads the same line.
    pub fn read_pending(&mut self) -> io::Result<Option<PendingLine>> {
        if self.read_pos != self.offset {
            self.reader.seek(SeekFrom::Start(self.offset))?;
            self.read_pos = self.offset;
        }

        let mut buf = Vec::new();
        let read = self.reader.read_until(b'\n', &mut buf)?;
        self.read_pos += read as u64;

        if read == 0 || buf.last() != Some(&b'\n') {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&buf);
        Ok(Some(PendingLine {
            index: self.next_index,
            text: text.trim_end_matches(['\n', '\r']).to_string(),
            len: read as u64,
        }))
    }

    /// Mark `line` as done; the next read starts after it.
    pub fn consume(&mut self, line: &PendingLine) {
        debug_assert_eq!(line.index, self.next_index);
        self.offset += line.len;
        self.next_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_and_consumes_lines_in_order() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "line 1").unwrap();
        writeln!(temp_file, "line 2").unwrap();
        temp_file.flush().unwrap();

        let mut cursor = FileCursor::open(temp_file.path()).unwrap();

        let first = cursor.read_pending().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.text, "line 1");
        cursor.consume(&first);

        let second = cursor.read_pending().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.text, "line 2");
        cursor.consume(&second);

        assert!(cursor.read_pending().unwrap().is_none());
        assert_eq!(cursor.offset(), 14);
        assert_eq!(cursor.next_index(), 2);
    }

    #[test]
    fn test_unconsumed_line_is_read_again() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "line 1").unwrap();
        writeln!(temp_file, "line 2").unwrap();
        temp_file.flush().unwrap();

        let mut cursor = FileCursor::open(temp_file.path()).unwrap();
        let first = cursor.read_pending().unwrap().unwrap();
        let again = cursor.read_pending().unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "half a li").unwrap();
        temp_file.flush().unwrap();

        let mut cursor = FileCursor::open(temp_file.path()).unwrap();
        assert!(cursor.read_pending().unwrap().is_none());
        assert!(cursor.has_unread().unwrap());

        writeln!(temp_file, "ne").unwrap();
        temp_file.flush().unwrap();

        let line = cursor.read_pending().unwrap().unwrap();
        assert_eq!(line.text, "half a line");
        assert_eq!(line.index, 0);
    }

    #[test]
    fn test_appended_lines_continue_numbering() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "line 1").unwrap();
        temp_file.flush().unwrap();

        let mut cursor = FileCursor::open(temp_file.path()).unwrap();
        let line = cursor.read_pending().unwrap().unwrap();
        cursor.consume(&line);
        assert!(cursor.read_pending().unwrap().is_none());

        let mut appender = OpenOptions::new().append(true).open(temp_file.path()).unwrap();
        writeln!(appender, "line 2").unwrap();

        let line = cursor.read_pending().unwrap().unwrap();
        assert_eq!(line.index, 1);
        assert_eq!(line.text, "line 2");
    }

    #[test]
    fn test_crlf_and_invalid_utf8() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"user \xff\xfe\r\n").unwrap();
        temp_file.flush().unwrap();

        let mut cursor = FileCursor::open(temp_file.path()).unwrap();
        let line = cursor.read_pending().unwrap().unwrap();
        assert!(line.text.starts_with("user "));
        assert!(!line.text.ends_with('\r'));
    }

    #[test]
    fn test_identity_differs_after_replace() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("auth.log");
        std::fs::write(&path, "a\n").unwrap();

        let cursor = FileCursor::open(&path).unwrap();
        assert_eq!(
            cursor.identity(),
            FileIdentity::of(&std::fs::metadata(&path).unwrap())
        );

        std::fs::rename(&path, dir.path().join("auth.log.1")).unwrap();
        std::fs::write(&path, "b\n").unwrap();

        assert_ne!(
            cursor.identity(),
            FileIdentity::of(&std::fs::metadata(&path).unwrap())
        );
        assert_eq!(cursor.file_len().unwrap(), 2);
    }
}
