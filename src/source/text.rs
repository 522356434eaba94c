#![warn(missing_docs)]
//! Text frame reader: one whitespace-separated float vector per line.

use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use super::{errors::SourceError, Frame, FrameSource};

/// Reads frames from a text file.
///
/// Blank lines and lines starting with `#` are skipped. The dimension is
/// the token count of the first frame; any later line with a different
/// token count is fatal. Byte offsets of emitted frames are remembered so
/// the output stage can seek back to individual members.
pub struct TextSource {
    path: PathBuf,
    reader: BufReader<File>,
    /// Byte offset of each emitted frame's line.
    offsets: Vec<u64>,
    /// Byte offset of the next line to be read.
    pos: u64,
    dim: Option<usize>,
    next_index: u64,
    lines_read: usize,
}

impl TextSource {
    /// Open a text input.
    pub fn open(path: &Path) -> Result<TextSource, SourceError> {
        let file = File::open(path).map_err(|_| SourceError::Open(path.to_path_buf()))?;
        Ok(TextSource {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            offsets: Vec::new(),
            pos: 0,
            dim: None,
            next_index: 0,
            lines_read: 0,
        })
    }

    fn parse_line(&self, line: &str, line_no: usize) -> Result<Option<Vec<f64>>, SourceError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        let mut data = Vec::new();
        for token in trimmed.split_whitespace() {
            let value = token.parse::<f64>().map_err(|_| SourceError::Parse {
                path: self.path.clone(),
                line: line_no,
                token: token.to_string(),
            })?;
            data.push(value);
        }
        Ok(Some(data))
    }

    /// Read and parse the single frame line at `offset`.
    fn read_at_offset(&mut self, offset: u64) -> Result<Vec<f64>, SourceError> {
        let saved = self.pos;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|_| SourceError::Read(self.path.clone()))?;
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|_| SourceError::Read(self.path.clone()))?;
        self.reader
            .seek(SeekFrom::Start(saved))
            .map_err(|_| SourceError::Read(self.path.clone()))?;
        match self.parse_line(&line, 0)? {
            Some(data) => Ok(data),
            None => Err(SourceError::Read(self.path.clone())),
        }
    }
}

impl FrameSource for TextSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            let line_start = self.pos;
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|_| SourceError::Read(self.path.clone()))?;
            if n == 0 {
                return Ok(None);
            }
            self.pos += n as u64;
            self.lines_read += 1;
            if let Some(data) = self.parse_line(&line, self.lines_read)? {
                match self.dim {
                    None => self.dim = Some(data.len()),
                    Some(expected) if expected != data.len() => {
                        return Err(SourceError::Mismatch {
                            index: self.next_index,
                            expected,
                            got: data.len(),
                        });
                    }
                    Some(_) => {}
                }
                self.offsets.push(line_start);
                let index = self.next_index;
                self.next_index += 1;
                return Ok(Some(Frame { index, data }));
            }
        }
    }

    fn frame_at(&mut self, index: u64) -> Result<Option<Frame>, SourceError> {
        let Some(&offset) = self.offsets.get(index as usize) else {
            return Ok(None);
        };
        let data = self.read_at_offset(offset)?;
        Ok(Some(Frame { index, data }))
    }

    fn dim(&self) -> Option<usize> {
        self.dim
    }

    fn shape(&self) -> Option<(u32, u32)> {
        self.dim.map(|d| (d as u32, 1))
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|_| SourceError::Read(self.path.clone()))?;
        self.pos = 0;
        self.next_index = 0;
        self.lines_read = 0;
        self.offsets.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_input(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_frames_and_skips_comments() {
        let file = write_input("# header\n1.0 2.0 3.0\n\n4.0 5.0 6.0\n");
        let mut source = TextSource::open(file.path()).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.data, vec![1.0, 2.0, 3.0]);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.data, vec![4.0, 5.0, 6.0]);
        assert_eq!(source.next_frame().unwrap(), None);
        assert_eq!(source.dim(), Some(3));
    }

    #[test]
    fn frame_at_does_not_disturb_streaming() {
        let file = write_input("1 1\n2 2\n3 3\n");
        let mut source = TextSource::open(file.path()).unwrap();
        source.next_frame().unwrap();
        source.next_frame().unwrap();
        let replay = source.frame_at(0).unwrap().unwrap();
        assert_eq!(replay.data, vec![1.0, 1.0]);
        let third = source.next_frame().unwrap().unwrap();
        assert_eq!(third.data, vec![3.0, 3.0]);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let file = write_input("1 2 3\n4 5\n");
        let mut source = TextSource::open(file.path()).unwrap();
        source.next_frame().unwrap();
        match source.next_frame() {
            Err(SourceError::Mismatch {
                index,
                expected,
                got,
            }) => {
                assert_eq!(index, 1);
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected mismatch, got {:?}", other.map(|f| f.map(|f| f.index))),
        }
    }

    #[test]
    fn reset_rewinds_to_first_frame() {
        let file = write_input("7 8\n9 10\n");
        let mut source = TextSource::open(file.path()).unwrap();
        source.next_frame().unwrap();
        source.reset().unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.data, vec![7.0, 8.0]);
    }

    #[test]
    fn bad_token_reports_location() {
        let file = write_input("1 2\nx 4\n");
        let mut source = TextSource::open(file.path()).unwrap();
        source.next_frame().unwrap();
        match source.next_frame() {
            Err(SourceError::Parse { line, token, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(token, "x");
            }
            _ => panic!("expected parse error"),
        }
    }
}
