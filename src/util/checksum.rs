use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::trace;

/// Algorithm of the checksum files a repository publishes next to each file, e.g. `x.jar.sha1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    /// nothing is verified or written
    None,
    Md5,
    #[default]
    Sha1,
}
impl Checksum {
    /// suffix of the checksum file, including the leading '.'
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Checksum::None => None,
            Checksum::Md5 => Some(".md5"),
            Checksum::Sha1 => Some(".sha1"),
        }
    }

    fn digest_len(&self) -> usize {
        match self {
            Checksum::None => 0,
            Checksum::Md5 => 16,
            Checksum::Sha1 => 20,
        }
    }

    pub fn validator(&self) -> Option<Box<dyn ChecksumValidator>> {
        match self {
            Checksum::None => None,
            Checksum::Md5 => Some(Box::new(Md5Validator::new())),
            Checksum::Sha1 => Some(Box::new(Sha1Validator::new())),
        }
    }

    pub fn digest(&self, data: &[u8]) -> Option<Vec<u8>> {
        let mut validator = self.validator()?;
        validator.add_data(data);
        Some(validator.digest())
    }

    /// Extracts the expected digest from the content of a checksum file.
    ///
    /// Published checksum files come in several flavors: the bare hex digest, the digest followed by
    ///  the file name (`sha1sum` output), or BSD style `SHA1 (x.jar) = <digest>`. Hex is accepted in
    ///  either case. Returns `None` if no token of the right length is valid hex.
    pub fn parse_checksum_file(&self, content: &str) -> Option<Vec<u8>> {
        let expected_len = self.digest_len();
        if expected_len == 0 {
            return None;
        }

        content.split(|c: char| c.is_whitespace() || c == '=')
            .filter(|token| token.len() == 2*expected_len)
            .find_map(|token| hex::decode(token).ok())
    }

    /// content of a checksum file in the form Maven writes it
    pub fn format_checksum_file(digest: &[u8]) -> String {
        hex::encode(digest)
    }

    /// Verifies `data` against the content of a checksum file
    pub fn verify(&self, data: &[u8], checksum_file: &str) -> ChecksumVerification {
        let Some(mut validator) = self.validator() else {
            return ChecksumVerification::NotChecked;
        };
        let Some(expected) = self.parse_checksum_file(checksum_file) else {
            return ChecksumVerification::Malformed;
        };

        validator.add_data(data);
        let actual = validator.digest();
        trace!("validating {} checksum", self);
        if actual == expected {
            ChecksumVerification::Valid
        }
        else {
            ChecksumVerification::Mismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            }
        }
    }
}
impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Checksum::None => "no",
            Checksum::Md5 => "MD5",
            Checksum::Sha1 => "SHA1",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumVerification {
    NotChecked,
    Valid,
    Malformed,
    Mismatch { expected: String, actual: String },
}
impl ChecksumVerification {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, ChecksumVerification::NotChecked | ChecksumVerification::Valid)
    }
}
impl Display for ChecksumVerification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumVerification::NotChecked => write!(f, "checksum not checked"),
            ChecksumVerification::Valid => write!(f, "checksum valid"),
            ChecksumVerification::Malformed => write!(f, "malformed checksum file"),
            ChecksumVerification::Mismatch { expected, actual } =>
                write!(f, "checksum mismatch: expected {}, was {}", expected, actual),
        }
    }
}

pub trait ChecksumValidator: Send {
    fn add_data(&mut self, data: &[u8]);
    fn digest(&self) -> Vec<u8>;
}

pub struct Sha1Validator {
    hasher: Sha1,
}
impl Sha1Validator {
    pub fn new() -> Sha1Validator {
        Sha1Validator {
            hasher: Default::default(),
        }
    }
}
impl ChecksumValidator for Sha1Validator {
    fn add_data(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn digest(&self) -> Vec<u8> {
        self.hasher.clone().finalize().to_vec()
    }
}

pub struct Md5Validator {
    context: md5::Context,
}
impl Md5Validator {
    pub fn new() -> Md5Validator {
        Md5Validator {
            context: md5::Context::new(),
        }
    }
}
impl ChecksumValidator for Md5Validator {
    fn add_data(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn digest(&self) -> Vec<u8> {
        let hash: [u8;16] = self.context.clone()
            .finalize()
            .into();
        hash.to_vec()
    }
}
