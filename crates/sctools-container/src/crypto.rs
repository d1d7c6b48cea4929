//! Container payload cipher.
//!
//! AES-256 in ECB mode without padding, applied [`ROUNDS`] times in a row.
//! Only whole 16-byte blocks are transformed; a trailing partial block is
//! stored as-is.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

pub const KEY_LENGTH: usize = 32;
pub const BLOCK_LENGTH: usize = 16;
pub const ROUNDS: usize = 16;

/// A 256-bit AES key.
pub type AesKey = [u8; KEY_LENGTH];

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn encrypt(data: &mut [u8], key: &AesKey) {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    for _ in 0..ROUNDS {
        for block in data.chunks_exact_mut(BLOCK_LENGTH) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn decrypt(data: &mut [u8], key: &AesKey) {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    for _ in 0..ROUNDS {
        for block in data.chunks_exact_mut(BLOCK_LENGTH) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}
