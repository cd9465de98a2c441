use rand::{rngs::SmallRng, RngCore, SeedableRng};

/// Fixed-size transfer buffer shared by the write and read phases
pub struct TransferBuffer {
    data: Vec<u8>,
}

impl TransferBuffer {
    /// Buffer filled with pseudo-random bytes
    pub fn random(size: usize) -> Self {
        let mut data = vec![0u8; size];
        SmallRng::from_entropy().fill_bytes(&mut data);
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
