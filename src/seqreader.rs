use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceFormat {
    #[default]
    AutoDetect,
    Fasta,
    Fastq,
}

/// One parsed record. Buffers are reused across `next_sequence` calls.
#[derive(Default, Debug, Clone)]
pub struct Sequence {
    pub id: String,
    pub seq: Vec<u8>,
}

/// Streaming FASTA/FASTQ reader with O(record) memory. The format is
/// detected from the first record byte; `.gz` inputs are decompressed on the
/// fly.
pub struct SequenceReader {
    reader: Box<dyn BufRead + Send>,
    format: SequenceFormat,
    line: String,
    pending_header: Option<String>,
}

impl SequenceReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn BufRead + Send> =
            if path.extension().is_some_and(|e| e == "gz") {
                Box::new(BufReader::new(GzDecoder::new(file)))
            } else {
                Box::new(BufReader::new(file))
            };
        Ok(Self::from_reader(reader))
    }

    pub fn from_reader(reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            reader,
            format: SequenceFormat::AutoDetect,
            line: String::new(),
            pending_header: None,
        }
    }

    pub fn file_format(&self) -> SequenceFormat {
        self.format
    }

    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line)?;
        while self.line.ends_with('\n') || self.line.ends_with('\r') {
            self.line.pop();
        }
        Ok(n > 0)
    }

    /// Reads the next record into `seq`, returning false at end of input.
    pub fn next_sequence(&mut self, seq: &mut Sequence) -> io::Result<bool> {
        seq.id.clear();
        seq.seq.clear();

        let header = match self.pending_header.take() {
            Some(h) => h,
            None => {
                // Skip blank lines between records.
                loop {
                    if !self.read_line()? {
                        return Ok(false);
                    }
                    if !self.line.is_empty() {
                        break;
                    }
                }
                self.line.clone()
            }
        };

        if self.format == SequenceFormat::AutoDetect {
            self.format = match header.as_bytes().first().copied() {
                Some(b'>') => SequenceFormat::Fasta,
                Some(b'@') => SequenceFormat::Fastq,
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "unrecognized file format",
                    ))
                }
            };
        }

        match self.format {
            SequenceFormat::Fasta => {
                if !header.starts_with('>') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "malformed FASTA header",
                    ));
                }
                set_id(&mut seq.id, &header);
                while self.read_line()? {
                    if self.line.starts_with('>') {
                        self.pending_header = Some(self.line.clone());
                        break;
                    }
                    seq.seq.extend_from_slice(self.line.as_bytes());
                }
                Ok(true)
            }
            SequenceFormat::Fastq => {
                if !header.starts_with('@') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "malformed FASTQ header",
                    ));
                }
                set_id(&mut seq.id, &header);
                if !self.read_line()? {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                seq.seq.extend_from_slice(self.line.as_bytes());
                // Separator and quality lines are read and dropped.
                if !self.read_line()? || !self.line.starts_with('+') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "missing FASTQ separator line",
                    ));
                }
                if !self.read_line()? {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(true)
            }
            SequenceFormat::AutoDetect => unreachable!(),
        }
    }
}

// Record id: from the first char after >/@ up to the first whitespace.
fn set_id(id: &mut String, header: &str) {
    let body = &header[1..];
    id.push_str(body.split_whitespace().next().unwrap_or(body));
}
