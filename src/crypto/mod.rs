//! # Channel Crypto
//!
//! Steam network channel cryptography: session-key generation, RSA
//! encryption of the session key under the hardcoded universe public key,
//! and the AES+HMAC scheme used for all post-handshake channel traffic.
//!
//! ## Message encryption layout
//! ```text
//! [IV encrypted with AES-256-ECB (16)] [AES-256-CBC/PKCS7 ciphertext]
//! ```
//! The IV is not random: it is the first 13 bytes of
//! `HMAC-SHA1(prefix ++ plaintext, hmac_secret)` followed by a 3-byte random
//! prefix, which lets the receiver authenticate the plaintext by
//! reconstructing the HMAC from the decrypted IV. The HMAC secret for
//! channel traffic is the first 16 bytes of the session key.

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecrypt, BlockDecryptMut,
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::Aes256;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtocolError, Result};

type HmacSha1 = Hmac<Sha1>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;
const HMAC_COMPARE_SIZE: usize = 13;
const PREFIX_SIZE: usize = 3;
const SESSION_KEY_SIZE: usize = 32;
const HMAC_SECRET_SIZE: usize = 16;

/// Public universe key, DER-encoded SubjectPublicKeyInfo. Distributed with
/// the client, not derived at runtime.
const UNIVERSE_PUBLIC_KEY_DER: &[u8] = &[
    0x30, 0x81, 0x9d, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7,
    0x0d, 0x01, 0x01, 0x01, 0x05, 0x00, 0x03, 0x81, 0x8b, 0x00, 0x30, 0x81,
    0x87, 0x02, 0x81, 0x81, 0x00, 0xdf, 0xec, 0x1a, 0xd6, 0x2c, 0x10, 0x66,
    0x2c, 0x17, 0x35, 0x3a, 0x14, 0xb0, 0x7c, 0x59, 0x11, 0x7f, 0x9d, 0xd3,
    0xd8, 0x2b, 0x7a, 0xe3, 0xe0, 0x15, 0xcd, 0x19, 0x1e, 0x46, 0xe8, 0x7b,
    0x87, 0x74, 0xa2, 0x18, 0x46, 0x31, 0xa9, 0x03, 0x14, 0x79, 0x82, 0x8e,
    0xe9, 0x45, 0xa2, 0x49, 0x12, 0xa9, 0x23, 0x68, 0x73, 0x89, 0xcf, 0x69,
    0xa1, 0xb1, 0x61, 0x46, 0xbd, 0xc1, 0xbe, 0xbf, 0xd6, 0x01, 0x1b, 0xd8,
    0x81, 0xd4, 0xdc, 0x90, 0xfb, 0xfe, 0x4f, 0x52, 0x73, 0x66, 0xcb, 0x95,
    0x70, 0xd7, 0xc5, 0x8e, 0xba, 0x1c, 0x7a, 0x33, 0x75, 0xa1, 0x62, 0x34,
    0x46, 0xbb, 0x60, 0xb7, 0x80, 0x68, 0xfa, 0x13, 0xa7, 0x7a, 0x8a, 0x37,
    0x4b, 0x9e, 0xc6, 0xf4, 0x5d, 0x5f, 0x3a, 0x99, 0xf9, 0x9e, 0xc4, 0x3a,
    0xe9, 0x63, 0xa2, 0xbb, 0x88, 0x19, 0x28, 0xe0, 0xe7, 0x14, 0xc0, 0x42,
    0x89, 0x02, 0x01, 0x11,
];

/// Negotiated AES session key. Zeroized on drop; the channel HMAC secret is
/// its first 16 bytes rather than a separate secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Generate 32 cryptographically random bytes.
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }

    pub fn hmac_secret(&self) -> &[u8] {
        &self.key[..HMAC_SECRET_SIZE]
    }

    /// Encrypt one channel message under this key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt_message(plaintext, &self.key, self.hmac_secret())
    }

    /// Decrypt and authenticate one channel message under this key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        decrypt_message(ciphertext, &self.key, self.hmac_secret())
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// RSA-OAEP(SHA-1) encryption of `session_key ++ challenge` under the
/// universe public key. Produces the 128-byte key blob sent in
/// ChannelEncryptResponse.
pub fn encrypt_session_key(session_key: &SessionKey, challenge: &[u8]) -> Result<Vec<u8>> {
    let public_key = RsaPublicKey::from_public_key_der(UNIVERSE_PUBLIC_KEY_DER)
        .map_err(|_| ProtocolError::EncryptionFailure)?;

    let mut payload = Vec::with_capacity(SESSION_KEY_SIZE + challenge.len());
    payload.extend_from_slice(session_key.as_bytes());
    payload.extend_from_slice(challenge);

    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &payload)
        .map_err(|_| ProtocolError::EncryptionFailure)
}

/// Encrypt a message using AES-256 ECB (IV block) + CBC/PKCS7 (body) with an
/// HMAC-SHA1-derived IV.
pub fn encrypt_message(plaintext: &[u8], key: &[u8; 32], hmac_secret: &[u8]) -> Result<Vec<u8>> {
    let mut prefix = [0u8; PREFIX_SIZE];
    OsRng.fill_bytes(&mut prefix);

    // Qualified: KeyInit is also in scope and provides new_from_slice.
    let mut mac = <HmacSha1 as Mac>::new_from_slice(hmac_secret)
        .map_err(|_| ProtocolError::EncryptionFailure)?;
    mac.update(&prefix);
    mac.update(plaintext);
    let digest = mac.finalize().into_bytes();

    let mut iv = [0u8; BLOCK_SIZE];
    iv[..HMAC_COMPARE_SIZE].copy_from_slice(&digest[..HMAC_COMPARE_SIZE]);
    iv[HMAC_COMPARE_SIZE..].copy_from_slice(&prefix);

    let ecb = Aes256::new(GenericArray::from_slice(key));
    let mut iv_block = GenericArray::clone_from_slice(&iv);
    ecb.encrypt_block(&mut iv_block);

    let cbc = Aes256CbcEnc::new_from_slices(key, &iv)
        .map_err(|_| ProtocolError::EncryptionFailure)?;
    let ciphertext = cbc.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(&iv_block);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`encrypt_message`]. A failed HMAC verification is a fatal
/// protocol violation for the connection that received the message.
pub fn decrypt_message(ciphertext: &[u8], key: &[u8; 32], hmac_secret: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < BLOCK_SIZE {
        return Err(ProtocolError::DecryptionFailure);
    }

    let ecb = Aes256::new(GenericArray::from_slice(key));
    let mut iv = GenericArray::clone_from_slice(&ciphertext[..BLOCK_SIZE]);
    ecb.decrypt_block(&mut iv);

    let cbc = Aes256CbcDec::new_from_slices(key, &iv)
        .map_err(|_| ProtocolError::DecryptionFailure)?;
    let plaintext = cbc
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext[BLOCK_SIZE..])
        .map_err(|_| ProtocolError::DecryptionFailure)?;

    let mut mac = <HmacSha1 as Mac>::new_from_slice(hmac_secret)
        .map_err(|_| ProtocolError::DecryptionFailure)?;
    mac.update(&iv[BLOCK_SIZE - PREFIX_SIZE..]);
    mac.update(&plaintext);
    let digest = mac.finalize().into_bytes();

    if digest[..HMAC_COMPARE_SIZE] != iv[..HMAC_COMPARE_SIZE] {
        return Err(ProtocolError::HmacVerificationFailure);
    }

    Ok(plaintext)
}

/// Standard CRC-32 of a byte sequence.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
