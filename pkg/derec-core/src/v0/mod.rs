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

use crate::{
    shamir::{Error as ShamirError, Shard},
    v0::wire::prefixes::*,
};

use std::{collections::BTreeMap, fmt};

use chacha20poly1305::ChaCha20Poly1305;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use multihash::Multihash;
use multihash_codetable::{Code, MultihashDigest};
use zeroize::Zeroize;

mod channel;
mod pairing;
mod recover;
mod sharing;
mod verification;

pub(crate) mod wire;

pub use channel::{decrypt_message, encrypt_message, encrypt_message_with_rng, ChannelMessage};
pub use pairing::{
    create_contact_message, create_contact_message_with_rng, process_pairing_response_message,
    produce_pairing_request_message, produce_pairing_request_message_with_rng,
    produce_pairing_response_message, ContactMessage, PairRequestMessage, PairResponseMessage,
    PairingSecretKeyMaterial, PairingSharedKey, Role,
};
pub use recover::{
    generate_share_request, generate_share_request_with_rng, generate_share_response,
    recover_from_share_responses, recover_with_report, Recovery, Rejection, RejectionReason,
    ShareRequest, ShareResponse,
};
pub use sharing::{protect_secret, protect_secret_with_rng};
pub use verification::{
    generate_verification_request, generate_verification_request_with_rng,
    generate_verification_response, verify_share_response, VerificationRequest,
    VerificationResponse,
};
pub use wire::{multibase_strip, FromWire, ToWire};

/// Identifier of the logical channel between a sharer and one helper.
pub type ChannelId = u64;

/// Version of a split. A new split of the same secret uses a new version.
pub type Version = u32;

/// Short human-readable identifier for a share, derived from its point.
pub type ShardId = String;

/// The output of the protection engine: one share per channel.
pub type Shares = BTreeMap<ChannelId, Share>;

/// Format version of every share produced by this module.
const FORMAT_VERSION: u32 = 0;

pub(crate) type ChaChaPolyKey = chacha20poly1305::Key;
pub(crate) const CHACHAPOLY_KEY_LENGTH: usize = 32;

pub(crate) type ChaChaPolyNonce = chacha20poly1305::Nonce;
pub(crate) const CHACHAPOLY_NONCE_LENGTH: usize = 12;

/// Length of the random nonces carried by verification and share requests.
pub const REQUEST_NONCE_LENGTH: usize = 32;

#[cfg(test)]
#[test]
fn check_length_consts() {
    // GenericArray doesn't give us a way to get the size, so we need to do this
    // in a test...
    assert_eq!(CHACHAPOLY_KEY_LENGTH, ChaChaPolyKey::default().len());
    assert_eq!(CHACHAPOLY_NONCE_LENGTH, ChaChaPolyNonce::default().len());
}

const CHECKSUM_ALGORITHM: Code = Code::Blake2b256;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("security invariant violated: {0}")]
    InvariantViolation(&'static str),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("version mismatch: expected version {expected} but found {found}")]
    VersionMismatch { expected: Version, found: Version },

    #[error("message belongs to a different {0}")]
    BindingMismatch(&'static str),

    #[error(
        "not enough valid shares to recover the secret ({valid} valid, {} rejected)",
        .rejected.len()
    )]
    InsufficientShares {
        /// The threshold claimed by the valid shares, if there were any.
        needed: Option<u32>,
        valid: usize,
        rejected: Vec<Rejection>,
    },

    #[error("inconsistent shares from channels {channels:?}: {reason}")]
    InconsistentShares {
        channels: Vec<ChannelId>,
        reason: &'static str,
    },

    #[error("pairing handshake failed: {0}")]
    Handshake(String),

    #[error("aead encryption cryptographic error: {0}")]
    AeadEncryption(aead::Error),

    #[error("aead decryption cryptographic error: {0}")]
    AeadDecryption(aead::Error),

    #[error("shamir algorithm operation: {0}")]
    Shamir(#[from] ShamirError),
}

/// Opaque identifier of a protected secret, stable across re-splitting.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SecretId(Vec<u8>);

impl SecretId {
    /// An empty id has no wire form, so it is refused with `Configuration`.
    pub fn new<B: Into<Vec<u8>>>(id: B) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::Configuration("secret id must not be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for SecretId {
    type Error = Error;

    fn try_from(id: Vec<u8>) -> Result<Self, Error> {
        Self::new(id)
    }
}

impl TryFrom<&[u8]> for SecretId {
    type Error = Error;

    fn try_from(id: &[u8]) -> Result<Self, Error> {
        Self::new(id)
    }
}

impl AsRef<[u8]> for SecretId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&multibase::encode(multibase::Base::Base32Z, &self.0))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for SecretId {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let mut id = Vec::<u8>::arbitrary(g);
        id.push(u8::arbitrary(g));
        Self(id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Identity {
    pub(crate) id_public_key: VerifyingKey,
    pub(crate) id_signature: Signature,
}

#[cfg(test)]
impl quickcheck::Arbitrary for Identity {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let bytes = Vec::<u8>::arbitrary(g);

        let id_keypair = SigningKey::generate(&mut rand::thread_rng());
        let id_signature = id_keypair.sign(&bytes);

        Self {
            id_public_key: id_keypair.verifying_key(),
            id_signature,
        }
    }
}

// Copied from <https://github.com/BurntSushi/quickcheck/pull/292/files>.
#[cfg(test)]
pub(crate) fn arbitrary_fill_slice<S, T>(g: &mut quickcheck::Gen, mut slice: S)
where
    T: quickcheck::Arbitrary,
    S: AsMut<[T]>,
{
    slice.as_mut().fill_with(|| T::arbitrary(g))
}

/// The value that is actually split between the helpers: the key that the
/// secret data is encrypted with.
pub(crate) struct ShardSecret {
    pub(crate) data_key: ChaChaPolyKey,
}

impl fmt::Debug for ShardSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardSecret")
            .field("data_key", &"<redacted>")
            .finish()
    }
}

impl Drop for ShardSecret {
    fn drop(&mut self) {
        self.data_key.as_mut_slice().zeroize();
    }
}

/// Metadata shared by every share of one split. It is also the associated
/// data of the encrypted secret, so it cannot be altered without detection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ShareMeta {
    pub(crate) format_version: u32, // must be 0 for this version
    pub(crate) secret_id: SecretId,
    pub(crate) version: Version,
    pub(crate) threshold: u32,
}

impl ShareMeta {
    fn aad(&self, id_public_key: &VerifyingKey) -> Vec<u8> {
        let mut bytes = self.to_wire();

        // Append the public key used for signing.
        bytes.push(b'k');
        bytes.extend_from_slice(id_public_key.as_bytes());

        bytes
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for ShareMeta {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            secret_id: SecretId::arbitrary(g),
            version: Version::arbitrary(g),
            threshold: u32::arbitrary(g),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ShareBuilder {
    pub(crate) meta: ShareMeta,
    pub(crate) nonce: ChaChaPolyNonce,
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) shard: Shard,
}

impl ShareBuilder {
    fn signable_bytes(&self, id_public_key: &VerifyingKey) -> Vec<u8> {
        let mut bytes = self.to_wire();

        // Append the Ed25519 public key used for signing.
        wire::push_u32(&mut bytes, PREFIX_ED25519_PUB);
        bytes.extend_from_slice(id_public_key.as_bytes());

        bytes
    }

    fn sign(self, id_keypair: &SigningKey) -> Share {
        let bytes = self.signable_bytes(&id_keypair.verifying_key());
        Share {
            inner: self,
            identity: Identity {
                id_public_key: id_keypair.verifying_key(),
                id_signature: id_keypair.sign(&bytes),
            },
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for ShareBuilder {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let mut nonce = ChaChaPolyNonce::default();
        arbitrary_fill_slice(g, &mut nonce);
        let shard = Shard::arbitrary(g);
        let mut meta = ShareMeta::arbitrary(g);
        meta.threshold = shard.threshold();
        Self {
            meta,
            nonce,
            ciphertext: Vec::<u8>::arbitrary(g),
            shard,
        }
    }
}

/// One helper's fragment of a protected secret.
///
/// A share carries the encrypted secret, the helper's shard of the
/// encryption key, and a signature (by a key used only for this split) over
/// both. It is bound to exactly one secret id, version and channel.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct Share {
    pub(crate) inner: ShareBuilder,
    pub(crate) identity: Identity,
}

#[cfg(test)]
impl quickcheck::Arbitrary for Share {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let id_keypair = SigningKey::generate(&mut rand::thread_rng());
        ShareBuilder::arbitrary(g).sign(&id_keypair)
    }
}

impl Share {
    pub fn id(&self) -> ShardId {
        self.inner.shard.id()
    }

    pub fn secret_id(&self) -> &SecretId {
        &self.inner.meta.secret_id
    }

    pub fn version(&self) -> Version {
        self.inner.meta.version
    }

    /// Number of distinct shares needed to recover the secret.
    pub fn threshold(&self) -> u32 {
        self.inner.meta.threshold
    }

    pub(crate) fn shard(&self) -> &Shard {
        &self.inner.shard
    }

    pub(crate) fn id_public_key(&self) -> &VerifyingKey {
        &self.identity.id_public_key
    }

    /// Checksum of the encrypted secret. All shares of one split agree on it.
    pub fn ciphertext_checksum(&self) -> Multihash<64> {
        let mut bytes = self.inner.nonce.to_vec();
        bytes.extend_from_slice(&self.inner.ciphertext);
        CHECKSUM_ALGORITHM.digest(&bytes)
    }

    /// Whether the share's signature is valid for its own identity key.
    pub(crate) fn has_valid_signature(&self) -> bool {
        let id_public_key = &self.identity.id_public_key;
        id_public_key
            .verify_strict(
                &self.inner.signable_bytes(id_public_key),
                &self.identity.id_signature,
            )
            .is_ok()
    }

    /// Decrypt the secret data with a recovered key.
    pub(crate) fn decrypt(&self, secret: &ShardSecret) -> Result<Vec<u8>, Error> {
        use aead::{Aead, KeyInit, Payload};

        let aead = ChaCha20Poly1305::new(&secret.data_key);
        let payload = Payload {
            msg: &self.inner.ciphertext,
            aad: &self.inner.meta.aad(&self.identity.id_public_key),
        };
        aead.decrypt(&self.inner.nonce, payload)
            .map_err(Error::AeadDecryption)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::collections::BTreeMap;

    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn secret_id_display() {
        let id = SecretId::try_from(&b"abc"[..]).unwrap();
        assert_eq!(
            id.to_string(),
            multibase::encode(multibase::Base::Base32Z, b"abc")
        );
    }

    #[test]
    fn empty_secret_id_refused() {
        assert!(matches!(SecretId::new(vec![]), Err(Error::Configuration(_))));
        assert!(matches!(
            SecretId::try_from(&b""[..]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn shard_secret_debug_redacted() {
        let secret = ShardSecret {
            data_key: ChaChaPolyKey::from([0x42u8; 32]),
        };
        assert!(!format!("{:?}", secret).contains("42"));
    }

    #[quickcheck]
    fn share_signature_valid(share: Share) -> bool {
        share.has_valid_signature()
    }

    #[quickcheck]
    fn share_signature_covers_metadata(share: Share) -> bool {
        let mut share = share;
        share.inner.meta.version = share.inner.meta.version.wrapping_add(1);
        !share.has_valid_signature()
    }

    // The whole life of a secret: protect, verify, request and recover.
    #[test]
    fn end_to_end() {
        let mut rng = StdRng::seed_from_u64(0xde7ec);

        let secret_id = SecretId::new(vec![1, 2, 3, 4, 255]).unwrap();
        let secret_data = vec![5, 6, 7, 8, 255];
        let channels = [1, 2, 3];

        let shares = protect_secret_with_rng(&secret_id, &secret_data, &channels, 2, 1, &mut rng)
            .unwrap();
        assert_eq!(shares.keys().copied().collect::<Vec<_>>(), channels);

        // Each helper proves it holds its share.
        let request = generate_verification_request_with_rng(&secret_id, 1, &mut rng);
        let mut verifications = BTreeMap::new();
        for (&channel_id, share) in &shares {
            let response =
                generate_verification_response(&secret_id, channel_id, share, &request).unwrap();
            assert!(request.is_answered_by(&response));
            assert!(verify_share_response(&secret_id, channel_id, share, &response).unwrap());
            verifications.insert(channel_id, response);
        }

        // An answer from one helper does not vouch for another helper's share.
        assert!(!verify_share_response(&secret_id, 2, &shares[&2], &verifications[&1]).unwrap());
        assert!(!verify_share_response(&secret_id, 1, &shares[&2], &verifications[&1]).unwrap());

        // Any two of the three helpers are enough to get the secret back.
        for subset in [[1, 2], [1, 3], [2, 3]] {
            let responses = subset
                .iter()
                .map(|&channel_id| {
                    let request =
                        generate_share_request_with_rng(channel_id, &secret_id, 1, &mut rng);
                    let share = Share::from_wire(shares[&channel_id].to_wire()).unwrap();
                    let response =
                        generate_share_response(&secret_id, channel_id, &share, &request).unwrap();
                    (channel_id, response)
                })
                .collect::<BTreeMap<_, _>>();

            let recovered = recover_from_share_responses(&responses, &secret_id, 1).unwrap();
            assert_eq!(recovered, secret_data);
        }
    }
}
