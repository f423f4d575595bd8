//! Writes extracted files to disk.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Component, Path, PathBuf},
};

use sab_core::{
    error::{Error, Result},
    OutputSink,
};
use tracing::info;

/// Turns a stored name into a path below the output folder.
///
/// Both `/` and `\` separate components. Empty, `.` and `..` components are dropped so
/// nothing lands outside the folder.
pub fn relative_path(name: &str) -> PathBuf {
    name.split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .map(Path::new)
        .filter(|part| matches!(part.components().next(), Some(Component::Normal(_))))
        .collect()
}

/// Sink writing every file below a folder
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    overwrite: bool,
    current: Option<BufWriter<File>>,
    written: usize,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            root: root.into(),
            overwrite,
            current: None,
            written: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Flushes the last file, returning how many files were written.
    pub fn finish(mut self) -> Result<usize> {
        self.close()?;
        Ok(self.written)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.current.take() {
            file.flush()?;
        }
        Ok(())
    }
}

impl OutputSink for DirectorySink {
    fn new_file(&mut self, name: &str) -> Result<()> {
        self.close()?;

        let path = self.root.join(relative_path(name));
        if path == self.root {
            return Err(Error::CustomError(format!("invalid output name {name:?}")));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("writing {}", path.display());
        let file = if !self.overwrite {
            File::create_new(&path)?
        } else {
            File::create(&path)?
        };

        self.current = Some(BufWriter::new(file));
        self.written += 1;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .current
            .as_mut()
            .ok_or(Error::CustomError("no output file started".into()))?;
        file.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn stays_below_root() {
        assert_eq!(relative_path("scripts/ai/main.lua"), PathBuf::from("scripts/ai/main.lua"));
        assert_eq!(relative_path("data\\Meshes\\a.msh"), PathBuf::from("data/Meshes/a.msh"));
        assert_eq!(relative_path("/../../etc/./passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(relative_path(".."), PathBuf::new());
    }

    #[test]
    fn writes_and_refuses_overwrite() -> Result<()> {
        let dir = tempdir()?;

        let mut sink = DirectorySink::new(dir.path(), false);
        sink.new_file("D/D1.json")?;
        sink.send_data(b"{}")?;
        sink.write_file("brick.dds", b"DDS ")?;
        assert_eq!(sink.finish()?, 2);

        assert_eq!(std::fs::read(dir.path().join("D/D1.json"))?, b"{}");
        assert_eq!(std::fs::read(dir.path().join("brick.dds"))?, b"DDS ");

        let mut sink = DirectorySink::new(dir.path(), false);
        assert!(sink.new_file("brick.dds").is_err());
        assert!(sink.send_data(b"orphan").is_err());

        let mut sink = DirectorySink::new(dir.path(), true);
        sink.write_file("brick.dds", b"DDS 2")?;
        sink.finish()?;
        assert_eq!(std::fs::read(dir.path().join("brick.dds"))?, b"DDS 2");
        Ok(())
    }
}
