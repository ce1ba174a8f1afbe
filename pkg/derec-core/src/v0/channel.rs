/*
 * derec: decentralized secret recovery protocol core
 * Copyright (C) 2024 derec contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::v0::{ChaChaPolyKey, ChaChaPolyNonce, ChannelId, Error, PairingSharedKey};

use aead::{Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use rand::{rngs::OsRng, CryptoRng, RngCore};

/// A protocol payload encrypted under a channel's shared key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelMessage {
    pub(crate) nonce: ChaChaPolyNonce,
    pub(crate) ciphertext: Vec<u8>,
}

fn channel_aead(key: &PairingSharedKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(ChaChaPolyKey::from_slice(key.as_bytes()))
}

pub fn encrypt_message(
    key: &PairingSharedKey,
    channel_id: ChannelId,
    msg: &[u8],
) -> Result<ChannelMessage, Error> {
    encrypt_message_with_rng(key, channel_id, msg, &mut OsRng)
}

/// Encrypt `msg` for the channel `channel_id`. The channel id is
/// authenticated, so a message cannot be replayed on another channel that
/// happens to share the key.
pub fn encrypt_message_with_rng<R: RngCore + CryptoRng>(
    key: &PairingSharedKey,
    channel_id: ChannelId,
    msg: &[u8],
    rng: &mut R,
) -> Result<ChannelMessage, Error> {
    let mut nonce = ChaChaPolyNonce::default();
    rng.fill_bytes(&mut nonce);

    let aad = channel_id.to_le_bytes();
    let ciphertext = channel_aead(key)
        .encrypt(&nonce, Payload { msg, aad: &aad })
        .map_err(Error::AeadEncryption)?;

    Ok(ChannelMessage { nonce, ciphertext })
}

pub fn decrypt_message(
    key: &PairingSharedKey,
    channel_id: ChannelId,
    message: &ChannelMessage,
) -> Result<Vec<u8>, Error> {
    let aad = channel_id.to_le_bytes();
    channel_aead(key)
        .decrypt(
            &message.nonce,
            Payload {
                msg: &message.ciphertext,
                aad: &aad,
            },
        )
        .map_err(Error::AeadDecryption)
}

#[cfg(test)]
mod test {
    use super::*;

    use rand::{rngs::StdRng, SeedableRng};

    fn key(byte: u8) -> PairingSharedKey {
        PairingSharedKey::from_bytes([byte; 32])
    }

    #[quickcheck]
    fn encrypt_decrypt(msg: Vec<u8>, channel_id: ChannelId, seed: u64) -> bool {
        let mut rng = StdRng::seed_from_u64(seed);
        let message = encrypt_message_with_rng(&key(1), channel_id, &msg, &mut rng).unwrap();
        decrypt_message(&key(1), channel_id, &message).unwrap() == msg
    }

    #[test]
    fn wrong_key() {
        let message = encrypt_message(&key(1), 7, b"hello").unwrap();
        assert!(matches!(
            decrypt_message(&key(2), 7, &message),
            Err(Error::AeadDecryption(_))
        ));
    }

    #[test]
    fn wrong_channel() {
        let message = encrypt_message(&key(1), 7, b"hello").unwrap();
        assert!(matches!(
            decrypt_message(&key(1), 8, &message),
            Err(Error::AeadDecryption(_))
        ));
    }

    #[quickcheck]
    fn tampered(idx: usize, flip: u8) -> bool {
        let mut message = encrypt_message(&key(3), 1, b"hello helper").unwrap();
        let idx = idx % message.ciphertext.len();
        message.ciphertext[idx] ^= flip.max(1);
        decrypt_message(&key(3), 1, &message).is_err()
    }

    #[test]
    fn fresh_nonces() {
        let first = encrypt_message(&key(1), 7, b"hello").unwrap();
        let second = encrypt_message(&key(1), 7, b"hello").unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }
}
