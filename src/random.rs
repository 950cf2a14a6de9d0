//! Seeded, reproducible random values for templates.
//!
//! Every template execution draws from one shared stream so that the data a
//! mock hands out is stable across runs: the N-th UUID generated after start
//! is always the same. Draws are serialized through a mutex; concurrent
//! requests interleave, but each draw still comes from a single sequence.

use fake::faker::address::en::{CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{IPv4, SafeEmail, Username};
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;

/// Seed used by [`RandomContext::default`].
pub const DEFAULT_SEED: u64 = 2011;

/// Invalid arguments to a random draw.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RandomError {
    #[error("empty range: min {min} must be less than max {max}")]
    EmptyRange { min: String, max: String },

    #[error("unknown fake data kind \"{0}\"")]
    UnknownFakeKind(String),
}

/// Kinds accepted by [`RandomContext::fake`].
pub const FAKE_KINDS: &[&str] = &[
    "name",
    "first_name",
    "last_name",
    "email",
    "username",
    "phone",
    "city",
    "country",
    "street",
    "zip",
    "company",
    "word",
    "sentence",
    "ipv4",
];

/// Shared pseudo-random stream.
#[derive(Debug)]
pub struct RandomContext {
    rng: Mutex<StdRng>,
}

impl RandomContext {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform integer in `[min, max)`.
    pub fn random_int(&self, min: i64, max: i64) -> Result<i64, RandomError> {
        if min >= max {
            return Err(RandomError::EmptyRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(self.rng.lock().gen_range(min..max))
    }

    /// Uniform float in `[min, max)`.
    pub fn random_float(&self, min: f64, max: f64) -> Result<f64, RandomError> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(RandomError::EmptyRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        // Half-width keeps ranges as wide as -f64::MAX..f64::MAX finite.
        let half = max / 2.0 - min / 2.0;
        let mut rng = self.rng.lock();
        loop {
            let offset = half * rng.gen::<f64>();
            let value = min + offset + offset;
            if value < max {
                return Ok(value);
            }
        }
    }

    /// A UUID-shaped `8-4-4-4-12` hex string from 16 fresh bytes.
    ///
    /// No version or variant bits are set; this is not an RFC 4122 UUID.
    pub fn new_uuid_like(&self) -> String {
        let mut buf = [0u8; 16];
        self.rng.lock().fill_bytes(&mut buf);
        format!(
            "{}-{}-{}-{}-{}",
            hex(&buf[..4]),
            hex(&buf[4..6]),
            hex(&buf[6..8]),
            hex(&buf[8..10]),
            hex(&buf[10..])
        )
    }

    /// Fake data of the given kind, drawn from the shared stream.
    pub fn fake(&self, kind: &str) -> Result<String, RandomError> {
        let mut rng = self.rng.lock();
        let rng = &mut *rng;
        let value: String = match kind {
            "name" => Name().fake_with_rng(rng),
            "first_name" => FirstName().fake_with_rng(rng),
            "last_name" => LastName().fake_with_rng(rng),
            "email" => SafeEmail().fake_with_rng(rng),
            "username" => Username().fake_with_rng(rng),
            "phone" => PhoneNumber().fake_with_rng(rng),
            "city" => CityName().fake_with_rng(rng),
            "country" => CountryName().fake_with_rng(rng),
            "street" => StreetName().fake_with_rng(rng),
            "zip" => ZipCode().fake_with_rng(rng),
            "company" => CompanyName().fake_with_rng(rng),
            "word" => Word().fake_with_rng(rng),
            "sentence" => Sentence(3..8).fake_with_rng(rng),
            "ipv4" => IPv4().fake_with_rng(rng),
            other => return Err(RandomError::UnknownFakeKind(other.to_string())),
        };
        Ok(value)
    }
}

impl Default for RandomContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
