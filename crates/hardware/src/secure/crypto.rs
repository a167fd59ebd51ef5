//! Cryptographic primitives for block protection.
//!
//! The controller needs three functions and treats them as opaque, fixed-latency units:
//! 1. **Line tags:** a keyed hash over a metadata line, stored in the parent node.
//! 2. **MACs:** a keyed hash binding a block's address, counter and ciphertext.
//! 3. **Keystream:** counter-mode pad XORed with the plaintext for confidentiality.
//!
//! `Blake3Engine` implements all three with keyed BLAKE3 and domain separation.
//! Tags and MACs are never zero: zero is reserved for pristine (never written) metadata.

use crate::common::{Block, ProtectedUnit};

/// 64-bit tag or MAC value.
pub type Tag = u64;

const TAG_DOMAIN: &[u8] = b"cachet.tag.v1";
const MAC_DOMAIN: &[u8] = b"cachet.mac.v1";
const PAD_DOMAIN: &[u8] = b"cachet.pad.v1";
const KEY_CONTEXT: &str = "cachet 2024-01 secure memory engine key";

/// Pluggable crypto used by the controllers and the metadata store.
pub trait CryptoEngine: Send + Sync {
    /// Tag of a metadata line, stored in its parent slot (or the on-chip root).
    fn line_tag(&self, line_addr: u64, line: &Block) -> Tag;

    /// MAC over a block's ciphertext under its address and counter.
    fn mac(&self, block_addr: u64, counter: u64, ciphertext: &Block) -> Tag;

    /// Encryption pad for a block under its address and counter.
    fn keystream(&self, block_addr: u64, counter: u64) -> Block;
}

/// BLAKE3-based engine keyed from a configuration seed.
#[derive(Clone, Debug)]
pub struct Blake3Engine {
    key: [u8; 32],
}

impl Blake3Engine {
    /// Derives the engine key from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, &seed.to_le_bytes()),
        }
    }

    fn keyed(&self, domain: &[u8]) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        let _ = hasher.update(domain);
        hasher
    }
}

impl CryptoEngine for Blake3Engine {
    fn line_tag(&self, line_addr: u64, line: &Block) -> Tag {
        let mut hasher = self.keyed(TAG_DOMAIN);
        let _ = hasher.update(&line_addr.to_le_bytes());
        let _ = hasher.update(line);
        truncate(hasher.finalize().as_bytes())
    }

    fn mac(&self, block_addr: u64, counter: u64, ciphertext: &Block) -> Tag {
        let mut hasher = self.keyed(MAC_DOMAIN);
        let _ = hasher.update(&block_addr.to_le_bytes());
        let _ = hasher.update(&counter.to_le_bytes());
        let _ = hasher.update(ciphertext);
        truncate(hasher.finalize().as_bytes())
    }

    fn keystream(&self, block_addr: u64, counter: u64) -> Block {
        let mut hasher = self.keyed(PAD_DOMAIN);
        let _ = hasher.update(&block_addr.to_le_bytes());
        let _ = hasher.update(&counter.to_le_bytes());
        let mut pad = [0u8; 64];
        hasher.finalize_xof().fill(&mut pad);
        pad
    }
}

/// Folds a 32-byte digest to a non-zero 64-bit tag.
fn truncate(digest: &[u8; 32]) -> Tag {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    nonzero(u64::from_le_bytes(bytes))
}

/// Maps zero to one so a computed tag never collides with the pristine marker.
pub const fn nonzero(tag: Tag) -> Tag {
    if tag == 0 { 1 } else { tag }
}

/// Tag of a line, with the all-zero (pristine) line tagged zero.
pub fn tag_or_pristine(engine: &dyn CryptoEngine, line_addr: u64, line: &Block) -> Tag {
    if is_pristine(line) {
        0
    } else {
        engine.line_tag(line_addr, line)
    }
}

/// Returns `true` if every byte of the image is zero.
pub fn is_pristine(line: &Block) -> bool {
    line.iter().all(|&b| b == 0)
}

/// Encrypts a plaintext block under a fresh counter and computes its MAC.
///
/// # Arguments
///
/// * `engine` - Crypto engine.
/// * `block_addr` - Base address of the data block.
/// * `counter` - New counter value (never zero).
/// * `plaintext` - Block contents after the write has been merged.
///
/// # Returns
///
/// `(ciphertext, mac)`.
pub fn seal(
    engine: &dyn CryptoEngine,
    block_addr: u64,
    counter: u64,
    plaintext: &Block,
) -> (Block, Tag) {
    let pad = engine.keystream(block_addr, counter);
    let mut ciphertext = [0u8; 64];
    for (out, (p, k)) in ciphertext.iter_mut().zip(plaintext.iter().zip(pad.iter())) {
        *out = p ^ k;
    }
    let mac = engine.mac(block_addr, counter, &ciphertext);
    (ciphertext, mac)
}

/// Verifies a block's MAC and decrypts it.
///
/// A block with counter 0 has never been written: it must carry MAC 0 and an all-zero
/// ciphertext, and reads back as zeros.
///
/// # Returns
///
/// The plaintext, or the unit to blame when verification fails.
pub fn open(
    engine: &dyn CryptoEngine,
    block_addr: u64,
    counter: u64,
    mac: Tag,
    ciphertext: &Block,
) -> Result<Block, ProtectedUnit> {
    if counter == 0 {
        if mac != 0 {
            return Err(ProtectedUnit::Mac);
        }
        if !is_pristine(ciphertext) {
            return Err(ProtectedUnit::Data);
        }
        return Ok([0u8; 64]);
    }
    if engine.mac(block_addr, counter, ciphertext) != mac {
        return Err(ProtectedUnit::Mac);
    }
    let pad = engine.keystream(block_addr, counter);
    let mut plaintext = [0u8; 64];
    for (out, (c, k)) in plaintext.iter_mut().zip(ciphertext.iter().zip(pad.iter())) {
        *out = c ^ k;
    }
    Ok(plaintext)
}
