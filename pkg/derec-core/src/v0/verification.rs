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

use crate::v0::{
    wire::{push_secret_version, push_u64},
    ChannelId, Error, SecretId, Share, ToWire, Version, REQUEST_NONCE_LENGTH,
};

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use sha2::Sha384;

const VERIFICATION_DOMAIN: &[u8] = b"derec share verification";

pub(crate) const VERIFICATION_TAG_LENGTH: usize = 48;

/// A challenge asking a helper to prove it still holds its share of a given
/// secret version.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerificationRequest {
    pub(crate) secret_id: SecretId,
    pub(crate) version: Version,
    pub(crate) nonce: [u8; REQUEST_NONCE_LENGTH],
}

impl VerificationRequest {
    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Whether `response` is an answer to this particular challenge. This
    /// does not check the proof itself, see [`verify_share_response`].
    pub fn is_answered_by(&self, response: &VerificationResponse) -> bool {
        self.nonce == response.nonce
            && self.secret_id == response.secret_id
            && self.version == response.version
    }
}

/// A helper's answer to a [`VerificationRequest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerificationResponse {
    pub(crate) secret_id: SecretId,
    pub(crate) channel_id: ChannelId,
    pub(crate) version: Version,
    pub(crate) nonce: [u8; REQUEST_NONCE_LENGTH],
    pub(crate) tag: [u8; VERIFICATION_TAG_LENGTH],
}

impl VerificationResponse {
    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

pub fn generate_verification_request(
    secret_id: &SecretId,
    version: Version,
) -> VerificationRequest {
    generate_verification_request_with_rng(secret_id, version, &mut OsRng)
}

pub fn generate_verification_request_with_rng<R: RngCore + CryptoRng>(
    secret_id: &SecretId,
    version: Version,
    rng: &mut R,
) -> VerificationRequest {
    let mut nonce = [0u8; REQUEST_NONCE_LENGTH];
    rng.fill_bytes(&mut nonce);

    VerificationRequest {
        secret_id: secret_id.clone(),
        version,
        nonce,
    }
}

/// HMAC-SHA-384, keyed by the serialised share, over everything the answer
/// is bound to.
fn verification_mac(
    share: &Share,
    secret_id: &SecretId,
    channel_id: ChannelId,
    version: Version,
    nonce: &[u8; REQUEST_NONCE_LENGTH],
) -> Result<Hmac<Sha384>, Error> {
    let mut mac = Hmac::<Sha384>::new_from_slice(&share.to_wire())
        .map_err(|_| Error::InvariantViolation("hmac must accept keys of any length"))?;

    let mut bytes = VERIFICATION_DOMAIN.to_vec();
    push_secret_version(&mut bytes, secret_id, version);
    push_u64(&mut bytes, channel_id);
    bytes.extend_from_slice(nonce);
    mac.update(&bytes);

    Ok(mac)
}

/// Answer a verification challenge using the share held for `channel_id`.
pub fn generate_verification_response(
    secret_id: &SecretId,
    channel_id: ChannelId,
    share: &Share,
    request: &VerificationRequest,
) -> Result<VerificationResponse, Error> {
    if &request.secret_id != secret_id || share.secret_id() != secret_id {
        return Err(Error::BindingMismatch("secret id"));
    }
    if share.version() != request.version {
        return Err(Error::VersionMismatch {
            expected: request.version,
            found: share.version(),
        });
    }

    let mac = verification_mac(share, secret_id, channel_id, request.version, &request.nonce)?;
    let mut tag = [0u8; VERIFICATION_TAG_LENGTH];
    tag.copy_from_slice(&mac.finalize().into_bytes());

    tracing::debug!(channel_id, version = request.version, "answered verification request");

    Ok(VerificationResponse {
        secret_id: secret_id.clone(),
        channel_id,
        version: request.version,
        nonce: request.nonce,
        tag,
    })
}

/// Check a helper's verification response against the sharer's copy of the
/// share for that channel.
///
/// Any mismatch (another share, channel or secret, or a modified nonce or tag)
/// yields `Ok(false)`. Only a response for a different version of the secret
/// is reported as an error, since that usually means the helper has not yet
/// received the newest split.
pub fn verify_share_response(
    secret_id: &SecretId,
    channel_id: ChannelId,
    share: &Share,
    response: &VerificationResponse,
) -> Result<bool, Error> {
    if response.version != share.version() {
        return Err(Error::VersionMismatch {
            expected: share.version(),
            found: response.version,
        });
    }

    if &response.secret_id != secret_id
        || share.secret_id() != secret_id
        || response.channel_id != channel_id
    {
        tracing::debug!(channel_id, "verification response bound to another share");
        return Ok(false);
    }

    let mac = verification_mac(
        share,
        secret_id,
        channel_id,
        response.version,
        &response.nonce,
    )?;
    // verify_slice compares in constant time.
    let valid = mac.verify_slice(&response.tag).is_ok();

    tracing::debug!(channel_id, valid, "checked verification response");
    Ok(valid)
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::v0::{protect_secret_with_rng, Shares};

    use rand::{rngs::StdRng, SeedableRng};

    fn setup(seed: u64) -> (SecretId, Shares, StdRng) {
        let mut rng = StdRng::seed_from_u64(seed);
        let secret_id = SecretId::new(b"verify me".to_vec()).unwrap();
        let shares =
            protect_secret_with_rng(&secret_id, b"some data", &[10, 20, 30], 2, 4, &mut rng)
                .unwrap();
        (secret_id, shares, rng)
    }

    #[quickcheck]
    fn genuine_response_verifies(seed: u64) -> bool {
        let (secret_id, shares, mut rng) = setup(seed);
        let request = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        shares.iter().all(|(&channel_id, share)| {
            let response =
                generate_verification_response(&secret_id, channel_id, share, &request).unwrap();
            request.is_answered_by(&response)
                && verify_share_response(&secret_id, channel_id, share, &response).unwrap()
        })
    }

    #[test]
    fn fresh_nonces() {
        let (secret_id, _, mut rng) = setup(1);
        let first = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        let second = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        assert_ne!(first.nonce, second.nonce);
    }

    #[test]
    fn wrong_share_fails() {
        let (secret_id, shares, mut rng) = setup(2);
        let request = generate_verification_request_with_rng(&secret_id, 4, &mut rng);

        // Helper 20 answers with helper 10's share.
        let response =
            generate_verification_response(&secret_id, 20, &shares[&10], &request).unwrap();
        assert!(!verify_share_response(&secret_id, 20, &shares[&20], &response).unwrap());
    }

    #[test]
    fn wrong_channel_fails() {
        let (secret_id, shares, mut rng) = setup(3);
        let request = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        let response =
            generate_verification_response(&secret_id, 10, &shares[&10], &request).unwrap();
        assert!(!verify_share_response(&secret_id, 20, &shares[&10], &response).unwrap());
    }

    #[test]
    fn wrong_secret_id_fails() {
        let (secret_id, shares, mut rng) = setup(4);
        let request = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        let response =
            generate_verification_response(&secret_id, 10, &shares[&10], &request).unwrap();

        let other = SecretId::new(b"somebody else".to_vec()).unwrap();
        assert!(!verify_share_response(&other, 10, &shares[&10], &response).unwrap());
    }

    #[quickcheck]
    fn tampered_response_fails(seed: u64, idx: usize, flip: u8) -> bool {
        let (secret_id, shares, mut rng) = setup(seed);
        let request = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        let response =
            generate_verification_response(&secret_id, 30, &shares[&30], &request).unwrap();

        let flip = flip.max(1);
        let mut bad_tag = response.clone();
        bad_tag.tag[idx % VERIFICATION_TAG_LENGTH] ^= flip;
        let mut bad_nonce = response;
        bad_nonce.nonce[idx % REQUEST_NONCE_LENGTH] ^= flip;

        !verify_share_response(&secret_id, 30, &shares[&30], &bad_tag).unwrap()
            && !verify_share_response(&secret_id, 30, &shares[&30], &bad_nonce).unwrap()
    }

    #[test]
    fn version_mismatch() {
        let (secret_id, shares, mut rng) = setup(5);

        // A challenge for a newer split than the helper holds.
        let request = generate_verification_request_with_rng(&secret_id, 5, &mut rng);
        assert!(matches!(
            generate_verification_response(&secret_id, 10, &shares[&10], &request),
            Err(Error::VersionMismatch {
                expected: 5,
                found: 4
            })
        ));

        let request = generate_verification_request_with_rng(&secret_id, 4, &mut rng);
        let mut response =
            generate_verification_response(&secret_id, 10, &shares[&10], &request).unwrap();
        response.version = 3;
        assert!(matches!(
            verify_share_response(&secret_id, 10, &shares[&10], &response),
            Err(Error::VersionMismatch {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn foreign_request_refused() {
        let (secret_id, shares, mut rng) = setup(6);
        let other = SecretId::new(b"somebody else".to_vec()).unwrap();
        let request = generate_verification_request_with_rng(&other, 4, &mut rng);
        assert!(matches!(
            generate_verification_response(&secret_id, 10, &shares[&10], &request),
            Err(Error::BindingMismatch(_))
        ));
    }
}
