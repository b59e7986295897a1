//! Byte-oriented circular buffer between USB ingress and the audio output.
//!
//! The storage is statically sized by `N`. The usable `size` can be changed at runtime, which discards
//! any buffered data.
use heapless::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A ring buffer must hold at least one byte.
    ZeroSize,
    /// The requested size does not fit the static storage.
    CapacityExceeded { requested: usize, limit: usize },
}

pub struct RingBuffer<const N: usize> {
    storage: Vec<u8, N>,
    size: usize,
    head: usize,
    tail: usize,
    full: bool,
}

impl<const N: usize> RingBuffer<N> {
    /// Creates a ring buffer of `size` bytes, with `capacity` bytes of storage reserved up front.
    pub fn new(size: usize, capacity: usize) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::ZeroSize);
        }

        let capacity = capacity.max(size);
        let mut storage = Vec::new();
        storage.resize(capacity, 0).map_err(|_| Error::CapacityExceeded {
            requested: capacity,
            limit: N,
        })?;

        Ok(Self {
            storage,
            size,
            head: 0,
            tail: 0,
            full: false,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes of storage currently reserved.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        if self.full {
            self.size
        } else if self.head <= self.tail {
            self.tail - self.head
        } else {
            self.size - self.head + self.tail
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        self.size - self.len()
    }

    /// Fraction of the buffer that holds unread data, in `[0, 1]`.
    pub fn fill_ratio(&self) -> f32 {
        self.len() as f32 / self.size as f32
    }

    /// Appends as much of `data` as fits, and returns the number of bytes written.
    ///
    /// Bytes that do not fit are dropped.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.free());
        if count == 0 {
            return 0;
        }

        let right = self.size - self.tail;
        if count <= right {
            self.storage[self.tail..self.tail + count].copy_from_slice(&data[..count]);
            self.tail += count;
            if self.tail == self.size {
                self.tail = 0;
            }
        } else {
            self.storage[self.tail..self.size].copy_from_slice(&data[..right]);
            self.storage[..count - right].copy_from_slice(&data[right..count]);
            self.tail = count - right;
        }

        if self.tail == self.head {
            self.full = true;
        }

        count
    }

    /// Moves up to `buf.len()` of the oldest bytes into `buf`, and returns the number of bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.len());
        if count == 0 {
            return 0;
        }

        let right = self.size - self.head;
        if count <= right {
            buf[..count].copy_from_slice(&self.storage[self.head..self.head + count]);
            self.head += count;
            if self.head == self.size {
                self.head = 0;
            }
        } else {
            buf[..right].copy_from_slice(&self.storage[self.head..self.size]);
            buf[right..count].copy_from_slice(&self.storage[..count - right]);
            self.head = count - right;
        }

        self.full = false;
        count
    }

    /// Changes the usable size. Any change discards the buffered data.
    ///
    /// Requesting the current size keeps everything as it is.
    pub fn resize(&mut self, new_size: usize) -> Result<(), Error> {
        if new_size == 0 {
            return Err(Error::ZeroSize);
        }

        if new_size == self.size {
            return Ok(());
        }

        if new_size > self.storage.len() {
            self.storage.resize(new_size, 0).map_err(|_| Error::CapacityExceeded {
                requested: new_size,
                limit: N,
            })?;
        }

        self.size = new_size;
        self.clear();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.full = false;
    }
}
