//! Streaming digest verification for in-flight downloads.
//!
//! Mirrors the Python `digest.py` generator: bytes are passed through a
//! hasher chunk by chunk as they arrive, and only compared against the
//! expected value once the stream is exhausted. An absent or unrecognized
//! algorithm is a bypass, not an error — the caller simply receives the
//! bytes unchecked.

use base64::Engine;
use sha2::{Digest as _, Sha224, Sha256, Sha384, Sha512};

use crate::error::IntegrityError;

/// One of the SHA-2 family members the wire protocol's `Digest` header may
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
  Sha224,
  Sha256,
  Sha384,
  Sha512,
}

impl DigestAlgorithm {
  /// Parse a `Digest` header algorithm token, accepting both `sha256` and
  /// `SHA-256` style spellings.
  pub fn parse(token: &str) -> Option<DigestAlgorithm> {
    let normalized: String = token
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .map(|c| c.to_ascii_lowercase())
      .collect();
    match normalized.as_str() {
      "sha224" => Some(DigestAlgorithm::Sha224),
      "sha256" => Some(DigestAlgorithm::Sha256),
      "sha384" => Some(DigestAlgorithm::Sha384),
      "sha512" => Some(DigestAlgorithm::Sha512),
      _ => None,
    }
  }

  /// The lowercase wire name, used both when parsing headers and when
  /// naming sidecar files.
  pub fn name(self) -> &'static str {
    match self {
      DigestAlgorithm::Sha224 => "sha224",
      DigestAlgorithm::Sha256 => "sha256",
      DigestAlgorithm::Sha384 => "sha384",
      DigestAlgorithm::Sha512 => "sha512",
    }
  }

  /// The file extension appended to a sidecar digest file, e.g.
  /// `data.mtbl.sha256`.
  pub fn extension(self) -> &'static str {
    self.name()
  }
}

/// A digest accumulator that hashes bytes as they stream by and reports
/// whether the final digest matches an expected base64 value.
pub struct DigestVerifier {
  state: HasherState,
  expected_base64: String,
}

enum HasherState {
  Sha224(Box<Sha224>),
  Sha256(Box<Sha256>),
  Sha384(Box<Sha384>),
  Sha512(Box<Sha512>),
}

impl DigestVerifier {
  pub fn new(algorithm: DigestAlgorithm, expected_base64: impl Into<String>) -> DigestVerifier {
    let state = match algorithm {
      DigestAlgorithm::Sha224 => HasherState::Sha224(Box::new(Sha224::new())),
      DigestAlgorithm::Sha256 => HasherState::Sha256(Box::new(Sha256::new())),
      DigestAlgorithm::Sha384 => HasherState::Sha384(Box::new(Sha384::new())),
      DigestAlgorithm::Sha512 => HasherState::Sha512(Box::new(Sha512::new())),
    };
    DigestVerifier {
      state,
      expected_base64: expected_base64.into(),
    }
  }

  pub fn algorithm_name(&self) -> &'static str {
    match &self.state {
      HasherState::Sha224(_) => "sha224",
      HasherState::Sha256(_) => "sha256",
      HasherState::Sha384(_) => "sha384",
      HasherState::Sha512(_) => "sha512",
    }
  }

  /// Feed the next chunk of the stream into the hasher.
  pub fn update(&mut self, chunk: &[u8]) {
    match &mut self.state {
      HasherState::Sha224(h) => h.update(chunk),
      HasherState::Sha256(h) => h.update(chunk),
      HasherState::Sha384(h) => h.update(chunk),
      HasherState::Sha512(h) => h.update(chunk),
    }
  }

  /// Finalize the hash and compare against the expected value.
  pub fn finish(self) -> Result<(), IntegrityError> {
    let actual_base64 = match self.state {
      HasherState::Sha224(h) => base64::engine::general_purpose::STANDARD.encode(h.finalize()),
      HasherState::Sha256(h) => base64::engine::general_purpose::STANDARD.encode(h.finalize()),
      HasherState::Sha384(h) => base64::engine::general_purpose::STANDARD.encode(h.finalize()),
      HasherState::Sha512(h) => base64::engine::general_purpose::STANDARD.encode(h.finalize()),
    };

    if actual_base64 == self.expected_base64 {
      Ok(())
    } else {
      Err(IntegrityError::DigestMismatch {
        algorithm: self.algorithm_name().to_string(),
        expected: self.expected_base64,
        actual: actual_base64,
      })
    }
  }
}

/// Parse a `Digest: <alg>=<base64>` header value into its components.
/// Returns `None` for a malformed header or an algorithm we don't
/// recognize — both are treated as a bypass by the caller.
pub fn parse_digest_header(value: &str) -> Option<(DigestAlgorithm, String)> {
  let (alg_token, encoded) = value.split_once('=')?;
  let algorithm = DigestAlgorithm::parse(alg_token)?;
  Some((algorithm, encoded.to_string()))
}

/// Decode a base64 `Digest` header value into the lowercase hex form used
/// by sidecar files, e.g. for an `sha256sum`-style `{hex}  {name}` line.
pub fn base64_to_hex(encoded: &str) -> Option<String> {
  let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
  Some(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
