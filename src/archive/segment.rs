//! Segmented WARC container files

use super::record::WarcRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of segment `index`
pub fn segment_name(prefix: &str, index: u32, gzip: bool) -> String {
    format!("{}-{:05}.warc{}", prefix, index, if gzip { ".gz" } else { "" })
}

/// Parses the index out of a segment file name
pub fn parse_segment_index(prefix: &str, name: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
    let digits = rest
        .strip_suffix(".warc.gz")
        .or_else(|| rest.strip_suffix(".warc"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Index the next new segment should use: one past the highest existing file
pub fn next_segment_index(dir: &Path, prefix: &str) -> io::Result<u32> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut next = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(|n| parse_segment_index(prefix, n)) {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}

struct OpenSegment {
    out: BufWriter<File>,
    path: PathBuf,
    size: u64,
    /// Records written after the leading warcinfo
    records: u64,
}

/// Appends encoded records to numbered segment files, rolling over by size
pub struct SegmentWriter {
    dir: PathBuf,
    prefix: String,
    gzip: bool,
    max_size: u64,
    info_fields: Vec<(String, String)>,
    next_index: u32,
    current: Option<OpenSegment>,
    completed: Vec<PathBuf>,
}

impl SegmentWriter {
    pub fn new(
        dir: &Path,
        prefix: &str,
        gzip: bool,
        max_size: u64,
        info_fields: Vec<(String, String)>,
    ) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let next_index = next_segment_index(dir, prefix)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            gzip,
            max_size,
            info_fields,
            next_index,
            current: None,
            completed: Vec::new(),
        })
    }

    /// Writes records that must land in the same segment
    ///
    /// A group that would push a non-empty segment past the maximum size
    /// starts a new segment. A group larger than the maximum still gets a
    /// segment of its own. Returns the number of bytes written.
    pub fn write_group(&mut self, records: &[WarcRecord], date: &str) -> io::Result<u64> {
        let mut encoded = Vec::with_capacity(records.len());
        for record in records {
            encoded.push(record.encode(self.gzip)?);
        }
        let group_size: u64 = encoded.iter().map(|b| b.len() as u64).sum();

        let rollover = match &self.current {
            Some(segment) => segment.records > 0 && segment.size + group_size > self.max_size,
            None => true,
        };
        if rollover {
            self.open_next(date)?;
        }

        let segment = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no open segment"))?;
        for bytes in &encoded {
            segment.out.write_all(bytes)?;
        }
        segment.out.flush()?;
        segment.size += group_size;
        segment.records += encoded.len() as u64;

        Ok(group_size)
    }

    /// Path of the segment currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }

    /// Every segment this writer has opened, in order
    pub fn segments(&self) -> Vec<PathBuf> {
        let mut all = self.completed.clone();
        if let Some(segment) = &self.current {
            all.push(segment.path.clone());
        }
        all
    }

    /// Flushes and syncs the open segment
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(segment) = self.current.take() {
            finish_segment(segment.out)?;
            self.completed.push(segment.path);
        }
        Ok(())
    }

    fn open_next(&mut self, date: &str) -> io::Result<()> {
        self.close()?;

        let name = segment_name(&self.prefix, self.next_index, self.gzip);
        let path = self.dir.join(&name);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        self.next_index += 1;

        tracing::info!("Opened WARC segment {}", path.display());

        let mut out = BufWriter::new(file);
        let info = WarcRecord::warcinfo(&name, date, &self.info_fields).encode(self.gzip)?;
        out.write_all(&info)?;

        self.current = Some(OpenSegment {
            out,
            path,
            size: info.len() as u64,
            records: 0,
        });
        Ok(())
    }
}

fn finish_segment(mut out: BufWriter<File>) -> io::Result<()> {
    out.flush()?;
    out.get_ref().sync_all()
}
