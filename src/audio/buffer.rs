use parking_lot::Mutex;

/// Fixed-size ring of interleaved samples shared by the decoder and the
/// output callback. One slot always stays empty so a full ring can be told
/// apart from an empty one.
pub struct AudioBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
}

struct Ring {
    data: Box<[f32]>,
    read_pos: usize,
    write_pos: usize,
}

impl Ring {
    fn occupied(&self, capacity: usize) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            capacity - self.read_pos + self.write_pos
        }
    }
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                data: vec![0.0; capacity].into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
            }),
            capacity,
        }
    }

    /// Writes as many samples as fit and returns how many that was.
    pub fn push_samples(&self, samples: &[f32]) -> usize {
        let mut ring = self.ring.lock();
        let available = self.capacity - ring.occupied(self.capacity) - 1;
        let to_write = samples.len().min(available);

        let write_pos = ring.write_pos;
        for (i, &sample) in samples.iter().enumerate().take(to_write) {
            let pos = (write_pos + i) % self.capacity;
            ring.data[pos] = sample;
        }

        ring.write_pos = (write_pos + to_write) % self.capacity;
        to_write
    }

    pub fn pop_samples(&self, out: &mut [f32]) -> usize {
        let mut ring = self.ring.lock();
        let available = ring.occupied(self.capacity);
        let to_read = out.len().min(available);

        let read_pos = ring.read_pos;
        for (i, out_sample) in out.iter_mut().enumerate().take(to_read) {
            let pos = (read_pos + i) % self.capacity;
            *out_sample = ring.data[pos];
        }

        ring.read_pos = (read_pos + to_read) % self.capacity;
        to_read
    }

    pub fn available_space(&self) -> usize {
        self.capacity - self.occupied() - 1
    }

    pub fn occupied(&self) -> usize {
        self.ring.lock().occupied(self.capacity)
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.read_pos = 0;
        ring.write_pos = 0;
    }
}
