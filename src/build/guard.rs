use std::path::Path;

use tracing::warn;

use crate::env::Env;
use crate::error::Result;
use crate::table::TableWriter;

/// Owns a table writer for the span of one build and guarantees it is
/// released exactly once.
///
/// `finish` succeeding ends the writer's life. Every other way out of the
/// scope (an explicit `abandon`, a `?` return, a panic while scanning, or a
/// failed `finish`) abandons the writer, at most once.
pub(crate) struct WriterGuard<'a> {
    writer: Box<dyn TableWriter + 'a>,
    released: bool,
}

impl<'a> WriterGuard<'a> {
    pub(crate) fn new(writer: Box<dyn TableWriter + 'a>) -> Self {
        WriterGuard {
            writer,
            released: false,
        }
    }

    /// The guarded writer, for adding entries.
    pub(crate) fn writer(&mut self) -> &mut (dyn TableWriter + 'a) {
        self.writer.as_mut()
    }

    /// Finalize the table. On failure the writer stays unreleased and is
    /// abandoned when the guard drops.
    pub(crate) fn finish(&mut self) -> Result<u64> {
        let size = self.writer.finish()?;
        self.released = true;
        Ok(size)
    }

    /// Discard buffered state without finalizing.
    pub(crate) fn abandon(&mut self) {
        if !self.released {
            self.writer.abandon();
            self.released = true;
        }
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// Removes the output file if the build unwinds before reaching its
/// epilogue. Normal returns `disarm` it and let the driver decide.
pub(crate) struct OutputGuard<'a> {
    env: &'a dyn Env,
    path: &'a Path,
    armed: bool,
}

impl<'a> OutputGuard<'a> {
    pub(crate) fn new(env: &'a dyn Env, path: &'a Path) -> Self {
        OutputGuard {
            env,
            path,
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.env.file_exists(self.path) {
            return;
        }
        if let Err(e) = self.env.remove_file(self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove partial table file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DiskEnv;
    use crate::error::Error;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Counts {
        finished: Cell<u32>,
        abandoned: Cell<u32>,
    }

    struct CountingWriter {
        counts: Rc<Counts>,
        fail_finish: bool,
    }

    impl TableWriter for CountingWriter {
        fn add(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
            Ok(())
        }
        fn finish(&mut self) -> Result<u64> {
            if self.fail_finish {
                return Err(Error::Corruption("injected".into()));
            }
            self.counts.finished.set(self.counts.finished.get() + 1);
            Ok(10)
        }
        fn abandon(&mut self) {
            self.counts.abandoned.set(self.counts.abandoned.get() + 1);
        }
        fn num_entries(&self) -> u64 {
            0
        }
        fn file_size(&self) -> u64 {
            0
        }
    }

    fn guard(counts: &Rc<Counts>, fail_finish: bool) -> WriterGuard<'static> {
        WriterGuard::new(Box::new(CountingWriter {
            counts: Rc::clone(counts),
            fail_finish,
        }))
    }

    #[test]
    fn finished_writer_is_not_abandoned() {
        let counts = Rc::new(Counts::default());
        {
            let mut g = guard(&counts, false);
            assert_eq!(g.finish().unwrap(), 10);
        }
        assert_eq!(counts.finished.get(), 1);
        assert_eq!(counts.abandoned.get(), 0);
    }

    #[test]
    fn dropped_writer_is_abandoned_once() {
        let counts = Rc::new(Counts::default());
        {
            let mut g = guard(&counts, false);
            g.abandon();
            g.abandon();
        }
        assert_eq!(counts.abandoned.get(), 1);

        let counts = Rc::new(Counts::default());
        drop(guard(&counts, false));
        assert_eq!(counts.abandoned.get(), 1);
    }

    #[test]
    fn armed_output_guard_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001.sst");
        fs::write(&path, b"partial").unwrap();
        drop(OutputGuard::new(&DiskEnv, &path));
        assert!(!path.exists());

        fs::write(&path, b"kept").unwrap();
        let mut guard = OutputGuard::new(&DiskEnv, &path);
        guard.disarm();
        drop(guard);
        assert!(path.exists());

        // Nothing to remove is not an error.
        fs::remove_file(&path).unwrap();
        drop(OutputGuard::new(&DiskEnv, &path));
    }

    #[test]
    fn failed_finish_is_abandoned_on_drop() {
        let counts = Rc::new(Counts::default());
        {
            let mut g = guard(&counts, true);
            assert!(g.finish().is_err());
        }
        assert_eq!(counts.finished.get(), 0);
        assert_eq!(counts.abandoned.get(), 1);
    }
}
