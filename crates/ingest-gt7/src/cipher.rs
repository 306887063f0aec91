//! Salsa20 packet encryption used by the GT7 simulator interface.
//!
//! Every datagram carries a 4-byte nonce seed at `0x40`. The 8-byte Salsa20
//! nonce is `iv1 ^ 0xDEADBEAF` followed by `iv1`, both little-endian, and the
//! keystream covers the whole datagram. A decrypted packet starts with the
//! magic `"G7S0"`; anything else is garbage or a misaligned read.

use ::cipher::{KeyIvInit, StreamCipher};
use salsa20::Salsa20;

const KEY_SOURCE: &[u8] = b"Simulator Interface Packet GT7 ver 0.0";

/// Protocol key: the source string truncated (or zero padded) to 32 bytes.
pub const KEY: [u8; 32] = key32(KEY_SOURCE);

pub const NONCE_OFFSET: usize = 0x40;
/// Smallest datagram that still carries a nonce seed.
pub const MIN_DATAGRAM_LEN: usize = NONCE_OFFSET + 4;
// 0xDEADBEAF, not 0xDEADBEEF. The console uses this exact value.
pub const NONCE_XOR: u32 = 0xDEAD_BEAF;
pub const MAGIC: u32 = 0x4737_5330;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("datagram too short to hold a nonce: {0} bytes")]
    TooShort(usize),
    #[error("magic mismatch: got 0x{0:08X}")]
    BadMagic(u32),
}

const fn key32(src: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    let mut i = 0;
    while i < key.len() && i < src.len() {
        key[i] = src[i];
        i += 1;
    }
    key
}

/// Reads the nonce seed (`iv1`) embedded in a raw datagram.
pub fn nonce_seed(raw: &[u8]) -> Result<u32, CipherError> {
    raw.get(NONCE_OFFSET..MIN_DATAGRAM_LEN)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(CipherError::TooShort(raw.len()))
}

pub fn nonce(iv1: u32) -> [u8; 8] {
    let iv2 = iv1 ^ NONCE_XOR;
    let mut nonce = [0u8; 8];
    nonce[..4].copy_from_slice(&iv2.to_le_bytes());
    nonce[4..].copy_from_slice(&iv1.to_le_bytes());
    nonce
}

/// XORs the keystream for `iv1` over `buf`. Applying it twice is a no-op.
pub fn apply_keystream(buf: &mut [u8], iv1: u32) {
    let nonce = nonce(iv1);
    let mut cipher = Salsa20::new((&KEY).into(), (&nonce).into());
    cipher.apply_keystream(buf);
}

/// Decrypts a datagram in place and checks the magic.
///
/// On `BadMagic` the buffer holds the (useless) keystream output and must not
/// be decoded.
pub fn decrypt_in_place(buf: &mut [u8]) -> Result<(), CipherError> {
    let iv1 = nonce_seed(buf)?;
    apply_keystream(buf, iv1);
    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC {
        return Err(CipherError::BadMagic(magic));
    }
    Ok(())
}

pub fn decrypt(raw: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut buf = raw.to_vec();
    decrypt_in_place(&mut buf)?;
    Ok(buf)
}

/// Builds a wire datagram from a plaintext frame, the way the console does.
///
/// The nonce seed overwrites bytes `0x40..0x44` of the ciphertext, so those
/// bytes do not survive a round trip.
pub fn seal(plain: &[u8], iv1: u32) -> Result<Vec<u8>, CipherError> {
    if plain.len() < MIN_DATAGRAM_LEN {
        return Err(CipherError::TooShort(plain.len()));
    }
    let mut out = plain.to_vec();
    apply_keystream(&mut out, iv1);
    out[NONCE_OFFSET..MIN_DATAGRAM_LEN].copy_from_slice(&iv1.to_le_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plain_frame(len: usize, fill: u8) -> Vec<u8> {
        let mut buf = vec![fill; len];
        buf[..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf
    }

    // Straight from the Salsa20/20 definition; used to pin the crate's output.
    fn reference_block(key: &[u8; 32], nonce: &[u8; 8], counter: u64) -> [u8; 64] {
        fn word(b: &[u8]) -> u32 {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        }
        fn quarter(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
            s[b] ^= s[a].wrapping_add(s[d]).rotate_left(7);
            s[c] ^= s[b].wrapping_add(s[a]).rotate_left(9);
            s[d] ^= s[c].wrapping_add(s[b]).rotate_left(13);
            s[a] ^= s[d].wrapping_add(s[c]).rotate_left(18);
        }
        let sigma = b"expand 32-byte k";
        let mut state = [0u32; 16];
        state[0] = word(&sigma[0..]);
        for i in 0..4 {
            state[1 + i] = word(&key[i * 4..]);
            state[11 + i] = word(&key[16 + i * 4..]);
        }
        state[5] = word(&sigma[4..]);
        state[6] = word(&nonce[0..]);
        state[7] = word(&nonce[4..]);
        state[8] = counter as u32;
        state[9] = (counter >> 32) as u32;
        state[10] = word(&sigma[8..]);
        state[15] = word(&sigma[12..]);

        let mut w = state;
        for _ in 0..10 {
            quarter(&mut w, 0, 4, 8, 12);
            quarter(&mut w, 5, 9, 13, 1);
            quarter(&mut w, 10, 14, 2, 6);
            quarter(&mut w, 15, 3, 7, 11);
            quarter(&mut w, 0, 1, 2, 3);
            quarter(&mut w, 5, 6, 7, 4);
            quarter(&mut w, 10, 11, 8, 9);
            quarter(&mut w, 15, 12, 13, 14);
        }
        let mut out = [0u8; 64];
        for i in 0..16 {
            out[i * 4..i * 4 + 4].copy_from_slice(&w[i].wrapping_add(state[i]).to_le_bytes());
        }
        out
    }

    #[test]
    fn key_is_truncated_protocol_string() {
        assert_eq!(&KEY, b"Simulator Interface Packet GT7 v");
    }

    #[test]
    fn nonce_is_xored_seed_then_seed() {
        let n = nonce(0x0102_0304);
        assert_eq!(&n[..4], &(0x0102_0304u32 ^ 0xDEAD_BEAF).to_le_bytes());
        assert_eq!(&n[4..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn keystream_matches_reference_salsa20() {
        let iv1 = 0xCAFE_F00D;
        let mut buf = vec![0u8; 296];
        apply_keystream(&mut buf, iv1);
        let n = nonce(iv1);
        for (block, chunk) in buf.chunks(64).enumerate() {
            let expected = reference_block(&KEY, &n, block as u64);
            assert_eq!(chunk, &expected[..chunk.len()], "block {block}");
        }
    }

    #[test]
    fn short_datagram_rejected_before_cipher() {
        let mut buf = vec![0u8; MIN_DATAGRAM_LEN - 1];
        assert_eq!(decrypt_in_place(&mut buf), Err(CipherError::TooShort(0x43)));
        assert_eq!(buf, vec![0u8; 0x43]);
    }

    #[test]
    fn sealed_frame_decrypts_to_magic() {
        let plain = plain_frame(296, 0x5A);
        let raw = seal(&plain, 7).unwrap();
        assert_eq!(nonce_seed(&raw), Ok(7));
        let out = decrypt(&raw).unwrap();
        assert_eq!(&out[..NONCE_OFFSET], &plain[..NONCE_OFFSET]);
        assert_eq!(&out[MIN_DATAGRAM_LEN..], &plain[MIN_DATAGRAM_LEN..]);
    }

    #[test]
    fn tampered_magic_is_rejected() {
        let mut raw = seal(&plain_frame(296, 0), 99).unwrap();
        raw[0] ^= 0x01;
        assert!(matches!(decrypt(&raw), Err(CipherError::BadMagic(_))));
    }

    proptest! {
        #[test]
        fn prop_keystream_is_self_inverse(
            data in proptest::collection::vec(any::<u8>(), MIN_DATAGRAM_LEN..600),
            iv1 in any::<u32>(),
        ) {
            let mut buf = data.clone();
            apply_keystream(&mut buf, iv1);
            apply_keystream(&mut buf, iv1);
            prop_assert_eq!(buf, data);
        }

        #[test]
        fn prop_decrypt_then_reencrypt_restores_raw(
            fill in any::<u8>(),
            iv1 in any::<u32>(),
        ) {
            let raw = seal(&plain_frame(296, fill), iv1).unwrap();
            let mut plain = decrypt(&raw).unwrap();
            apply_keystream(&mut plain, nonce_seed(&raw).unwrap());
            prop_assert_eq!(plain, raw);
        }

        #[test]
        fn prop_wrong_magic_never_decrypts(
            magic in any::<u32>().prop_filter("not the magic", |m| *m != MAGIC),
            iv1 in any::<u32>(),
        ) {
            let mut plain = vec![0u8; 296];
            plain[..4].copy_from_slice(&magic.to_le_bytes());
            let raw = seal(&plain, iv1).unwrap();
            prop_assert_eq!(decrypt(&raw), Err(CipherError::BadMagic(magic)));
        }
    }
}
