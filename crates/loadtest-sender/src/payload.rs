//! Random binary payloads of bounded size.

use bytes::Bytes;
use loadtest_core::{payload_len, ConfigError};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// A generated message body.
#[derive(Debug, Clone)]
pub struct Payload {
    pub size_mb: u64,
    pub data: Bytes,
}

impl Payload {
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Draws payload sizes uniformly from `[min_size_mb, max_size_mb]` and fills
/// them with pseudo-random bytes.
///
/// Each worker owns its own generator, so no RNG state is shared.
pub struct PayloadGenerator {
    min_size_mb: u64,
    max_size_mb: u64,
    rng: StdRng,
}

impl PayloadGenerator {
    /// Create a generator. `seed` makes the sequence reproducible.
    pub fn new(
        min_size_mb: u64,
        max_size_mb: u64,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if max_size_mb < min_size_mb {
            return Err(ConfigError::InvalidSizeRange {
                min: min_size_mb,
                max: max_size_mb,
            });
        }
        if payload_len(max_size_mb).is_none() {
            return Err(ConfigError::PayloadTooLarge(max_size_mb));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            min_size_mb,
            max_size_mb,
            rng,
        })
    }

    /// Next size in MB, inclusive of both bounds.
    pub fn next_size_mb(&mut self) -> u64 {
        self.rng.gen_range(self.min_size_mb..=self.max_size_mb)
    }

    /// Fill `size_mb` binary megabytes with random content.
    ///
    /// Fails for sizes whose byte length is not addressable.
    pub fn materialize(&mut self, size_mb: u64) -> Result<Bytes, ConfigError> {
        let len = payload_len(size_mb).ok_or(ConfigError::PayloadTooLarge(size_mb))?;
        let mut data = vec![0u8; len];
        self.rng.fill_bytes(&mut data);
        Ok(Bytes::from(data))
    }

    /// Pick a size and materialize it.
    pub fn generate(&mut self) -> Result<Payload, ConfigError> {
        let size_mb = self.next_size_mb();
        Ok(Payload {
            size_mb,
            data: self.materialize(size_mb)?,
        })
    }
}
