use std::fs::File;
use std::io::{Read, Result as IoResult, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};

/// Unbuffered view of a descriptor the process does not own.
///
/// Used in forked stage processes, where the buffered `std::io::stdin()` may
/// still hold bytes copied from the parent and descriptors 0/1 have just been
/// rewired to pipe ends or redirect targets.
struct BorrowedStream {
    file: ManuallyDrop<File>,
}

impl BorrowedStream {
    fn new(fd: RawFd) -> Self {
        // SAFETY: 0 and 1 stay open for the lifetime of the process and the
        // `ManuallyDrop` guarantees this handle never closes them.
        let file = unsafe { File::from_raw_fd(fd) };
        Self {
            file: ManuallyDrop::new(file),
        }
    }
}

/// Reader over descriptor 0.
pub struct RawStdin(BorrowedStream);

impl RawStdin {
    pub fn new() -> Self {
        Self(BorrowedStream::new(0))
    }
}

impl Read for RawStdin {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        (&*self.0.file).read(out)
    }
}

/// Writer over descriptor 1.
pub struct RawStdout(BorrowedStream);

impl RawStdout {
    pub fn new() -> Self {
        Self(BorrowedStream::new(1))
    }
}

impl Write for RawStdout {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        (&*self.0.file).write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
