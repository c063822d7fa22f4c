use crate::errors::CoreError;
use super::encryption::{KdfParams, Sealed, NONCE_LEN, SALT_LEN};

/// Magic bytes identifying a DCA ledger file.
pub const MAGIC: &[u8; 4] = b"DCAL";

/// Current file format version.
pub const CURRENT_VERSION: u16 = 1;

/// magic(4) + version(2) + kdf(12) + salt(16) + nonce(12) + ciphertext_len(8)
pub const HEADER_LEN: usize = 4 + 2 + 12 + SALT_LEN + NONCE_LEN + 8;

/// Bounds accepted for KDF parameters read from a file, so a crafted header
/// cannot demand unbounded memory or time.
const MEMORY_COST_RANGE: std::ops::RangeInclusive<u32> = 8..=1_048_576;
const TIME_COST_RANGE: std::ops::RangeInclusive<u32> = 1..=20;
const PARALLELISM_RANGE: std::ops::RangeInclusive<u32> = 1..=16;

/// Parsed file: format version, KDF parameters and the sealed payload.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    pub version: u16,
    pub kdf_params: KdfParams,
    pub sealed: Sealed,
}

/// Serialize a sealed payload.
///
/// Layout (integers little-endian):
/// ```text
/// [DCAL: 4B] [version: 2B] [memory_cost: 4B] [time_cost: 4B] [parallelism: 4B]
/// [salt: 16B] [nonce: 12B] [ciphertext_len: 8B] [ciphertext: variable]
/// ```
pub fn encode(kdf_params: &KdfParams, sealed: &Sealed) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + sealed.ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    buf.extend_from_slice(&kdf_params.memory_cost.to_le_bytes());
    buf.extend_from_slice(&kdf_params.time_cost.to_le_bytes());
    buf.extend_from_slice(&kdf_params.parallelism.to_le_bytes());
    buf.extend_from_slice(&sealed.salt);
    buf.extend_from_slice(&sealed.nonce);
    buf.extend_from_slice(&(sealed.ciphertext.len() as u64).to_le_bytes());
    buf.extend_from_slice(&sealed.ciphertext);
    buf
}

/// Parse and validate a ledger file. Trailing bytes after the ciphertext are ignored.
pub fn decode(data: &[u8]) -> Result<LedgerFile, CoreError> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a ledger file".into(),
        ));
    }

    let mut reader = ByteReader::new(data);
    if reader.take::<4>()? != *MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes — not a ledger file".into(),
        ));
    }

    let version = u16::from_le_bytes(reader.take()?);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let kdf_params = KdfParams {
        memory_cost: u32::from_le_bytes(reader.take()?),
        time_cost: u32::from_le_bytes(reader.take()?),
        parallelism: u32::from_le_bytes(reader.take()?),
    };
    check_range("memory_cost", kdf_params.memory_cost, &MEMORY_COST_RANGE)?;
    check_range("time_cost", kdf_params.time_cost, &TIME_COST_RANGE)?;
    check_range("parallelism", kdf_params.parallelism, &PARALLELISM_RANGE)?;

    let salt = reader.take::<SALT_LEN>()?;
    let nonce = reader.take::<NONCE_LEN>()?;
    let ciphertext_len = u64::from_le_bytes(reader.take()?);
    let ciphertext_len = usize::try_from(ciphertext_len)
        .map_err(|_| CoreError::InvalidFileFormat("Ciphertext length overflows".into()))?;
    let ciphertext = reader.take_slice(ciphertext_len)?.to_vec();

    Ok(LedgerFile {
        version,
        kdf_params,
        sealed: Sealed {
            salt,
            nonce,
            ciphertext,
        },
    })
}

fn check_range(name: &str, value: u32, range: &std::ops::RangeInclusive<u32>) -> Result<(), CoreError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidFileFormat(format!(
            "KDF {name} out of safe range: {value} (expected {}..{})",
            range.start(),
            range.end()
        )))
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], CoreError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                CoreError::InvalidFileFormat(format!(
                    "File truncated: needed {len} bytes at offset {}, {} left",
                    self.offset,
                    self.data.len() - self.offset
                ))
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CoreError> {
        let slice = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}
