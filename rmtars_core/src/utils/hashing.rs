//! Fingerprints of run inputs, stable across platforms and toolchains
use blake3::Hasher;

/// Incrementally builds a fingerprint out of heterogeneous values.
///
/// Every value is written with an explicit little-endian encoding, and variable
/// length values are prefixed with their length, so the digest only depends on the
/// values themselves. Floating point values are hashed by their bit pattern, so
/// `-0.0` and `0.0` produce different fingerprints.
pub(crate) struct Fingerprint {
    hasher: Hasher,
}

impl Fingerprint {
    pub(crate) fn new() -> Self {
        Fingerprint {
            hasher: Hasher::new(),
        }
    }

    pub(crate) fn add_usize(&mut self, value: usize) -> &mut Self {
        self.hasher.update(&(value as u64).to_le_bytes());
        self
    }

    pub(crate) fn add_bool(&mut self, value: bool) -> &mut Self {
        self.hasher.update(&[u8::from(value)]);
        self
    }

    pub(crate) fn add_str(&mut self, value: &str) -> &mut Self {
        self.add_usize(value.len());
        self.hasher.update(value.as_bytes());
        self
    }

    pub(crate) fn add_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.add_bool(true).add_str(value),
            None => self.add_bool(false),
        }
    }

    pub(crate) fn add_f64(&mut self, value: f64) -> &mut Self {
        self.hasher.update(&value.to_bits().to_le_bytes());
        self
    }

    pub(crate) fn add_f64_slice(&mut self, values: &[f64]) -> &mut Self {
        self.add_usize(values.len());
        for &v in values {
            self.add_f64(v);
        }
        self
    }

    pub(crate) fn add_usize_slice(&mut self, values: &[usize]) -> &mut Self {
        self.add_usize(values.len());
        for &v in values {
            self.add_usize(v);
        }
        self
    }

    pub(crate) fn finish_hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}
