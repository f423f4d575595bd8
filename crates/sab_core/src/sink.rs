//! Destinations for extracted files.

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Receives the files produced by an extractor
///
/// Data is appended to the file most recently started with [`OutputSink::new_file`]. Names
/// use `/` as separator and are relative to wherever the sink writes.
pub trait OutputSink {
    /// Starts a new output file
    fn new_file(&mut self, name: &str) -> Result<()>;

    /// Appends data to the current output file
    fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Writes a whole file in one go
    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.new_file(name)?;
        self.send_data(data)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn new_file(&mut self, name: &str) -> Result<()> {
        (**self).new_file(name)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_data(data)
    }
}

/// Sink keeping every file in memory, in creation order
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    files: IndexMap<String, Vec<u8>>,
    current: Option<String>,
}

impl MemorySink {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Files written so far
    pub fn files(&self) -> &IndexMap<String, Vec<u8>> {
        &self.files
    }

    /// Contents of a file by name
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Number of files written
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file was written
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Unwrap and return the files
    pub fn into_files(self) -> IndexMap<String, Vec<u8>> {
        self.files
    }
}

impl OutputSink for MemorySink {
    fn new_file(&mut self, name: &str) -> Result<()> {
        self.files.insert(name.to_owned(), Vec::new());
        self.current = Some(name.to_owned());
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .current
            .as_ref()
            .and_then(|name| self.files.get_mut(name))
            .ok_or(Error::CustomError("no output file started".into()))?;
        file.extend_from_slice(data);
        Ok(())
    }
}
