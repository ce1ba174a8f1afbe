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
    shamir::{self, Error as ShamirError},
    v0::{
        sharing::channel_point,
        wire::{push_length_prefixed, push_secret_version, push_u64},
        ChannelId, Error, FromWire, SecretId, ShardSecret, Share, ToWire, Version,
        CHECKSUM_ALGORITHM, REQUEST_NONCE_LENGTH,
    },
};

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    hash::{Hash, Hasher},
};

use ed25519_dalek::VerifyingKey;
use multihash::Multihash;
use multihash_codetable::MultihashDigest;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use zeroize::Zeroizing;

const RESPONSE_BINDING_DOMAIN: &[u8] = b"derec share response";

/// Request for the share a helper holds on `channel_id`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShareRequest {
    pub(crate) channel_id: ChannelId,
    pub(crate) secret_id: SecretId,
    pub(crate) version: Version,
    pub(crate) nonce: [u8; REQUEST_NONCE_LENGTH],
}

impl ShareRequest {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

/// A helper's reply to a [`ShareRequest`], carrying the serialised share.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShareResponse {
    pub(crate) channel_id: ChannelId,
    pub(crate) secret_id: SecretId,
    pub(crate) version: Version,
    pub(crate) request_nonce: [u8; REQUEST_NONCE_LENGTH],
    pub(crate) share: Vec<u8>,
    pub(crate) binding: Multihash<64>,
}

impl ShareResponse {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Whether this response echoes the nonce of `request`.
    pub fn answers(&self, request: &ShareRequest) -> bool {
        self.request_nonce == request.nonce
    }
}

fn response_binding(
    channel_id: ChannelId,
    secret_id: &SecretId,
    version: Version,
    request_nonce: &[u8; REQUEST_NONCE_LENGTH],
    share: &[u8],
) -> Multihash<64> {
    let mut bytes = RESPONSE_BINDING_DOMAIN.to_vec();
    push_u64(&mut bytes, channel_id);
    push_secret_version(&mut bytes, secret_id, version);
    bytes.extend_from_slice(request_nonce);
    push_length_prefixed(&mut bytes, share);

    CHECKSUM_ALGORITHM.digest(&bytes)
}

pub fn generate_share_request(
    channel_id: ChannelId,
    secret_id: &SecretId,
    version: Version,
) -> ShareRequest {
    generate_share_request_with_rng(channel_id, secret_id, version, &mut OsRng)
}

pub fn generate_share_request_with_rng<R: RngCore + CryptoRng>(
    channel_id: ChannelId,
    secret_id: &SecretId,
    version: Version,
    rng: &mut R,
) -> ShareRequest {
    let mut nonce = [0u8; REQUEST_NONCE_LENGTH];
    rng.fill_bytes(&mut nonce);

    ShareRequest {
        channel_id,
        secret_id: secret_id.clone(),
        version,
        nonce,
    }
}

/// Answer a share request with the share held for `channel_id`.
pub fn generate_share_response(
    secret_id: &SecretId,
    channel_id: ChannelId,
    share: &Share,
    request: &ShareRequest,
) -> Result<ShareResponse, Error> {
    if request.channel_id != channel_id {
        return Err(Error::BindingMismatch("channel"));
    }
    if &request.secret_id != secret_id || share.secret_id() != secret_id {
        return Err(Error::BindingMismatch("secret id"));
    }
    if share.version() != request.version {
        return Err(Error::VersionMismatch {
            expected: request.version,
            found: share.version(),
        });
    }

    let share = share.to_wire();
    let binding = response_binding(
        channel_id,
        secret_id,
        request.version,
        &request.nonce,
        &share,
    );

    tracing::debug!(channel_id, version = request.version, "answered share request");

    Ok(ShareResponse {
        channel_id,
        secret_id: secret_id.clone(),
        version: request.version,
        request_nonce: request.nonce,
        share,
        binding,
    })
}

/// Why a share response was left out of recovery.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RejectionReason {
    #[error("share could not be decoded: {0}")]
    Malformed(String),

    #[error("response was sent for a different channel")]
    ChannelMismatch,

    #[error("response belongs to a different secret")]
    SecretIdMismatch,

    #[error("expected version {expected} but found {found}")]
    VersionMismatch { expected: Version, found: Version },

    #[error("response integrity check failed")]
    BindingMismatch,

    #[error("share was not dealt to this channel")]
    WrongChannelPoint,

    #[error("share signature is forged")]
    ForgedSignature,
}

/// A share response that was not used for recovery, and why.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rejection {
    pub channel_id: ChannelId,
    pub reason: RejectionReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}: {}", self.channel_id, self.reason)
    }
}

/// The outcome of a successful recovery.
pub struct Recovery {
    secret: Vec<u8>,
    used: Vec<ChannelId>,
    rejected: Vec<Rejection>,
}

impl fmt::Debug for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovery")
            .field("secret", &"<redacted>")
            .field("used", &self.used)
            .field("rejected", &self.rejected)
            .finish()
    }
}

impl Recovery {
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn into_secret(self) -> Vec<u8> {
        self.secret
    }

    /// Channels whose shares agreed with the recovered secret.
    pub fn used_channels(&self) -> &[ChannelId] {
        &self.used
    }

    /// Responses that were ignored. Helpers listed here may be faulty.
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }
}

#[derive(Debug, Clone, Eq)]
struct HashablePublicKey(VerifyingKey);

impl PartialEq for HashablePublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl Hash for HashablePublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct GroupId {
    // All shares must agree on the format version. This could be faked by an
    // attacker but this is just a sanity-check.
    format_version: u32,
    secret_id: SecretId,
    version: Version,
    // All shares must agree on threshold.
    threshold: u32,
    // All shares must carry the same encrypted secret.
    ciphertext_checksum: Multihash<64>,
    // All shares must be signed by the same (per-split) identity.
    id_public_key: HashablePublicKey,
}

impl From<&Share> for GroupId {
    fn from(share: &Share) -> Self {
        Self {
            format_version: share.inner.meta.format_version,
            secret_id: share.secret_id().clone(),
            version: share.version(),
            threshold: share.threshold(),
            ciphertext_checksum: share.ciphertext_checksum(),
            id_public_key: HashablePublicKey(*share.id_public_key()),
        }
    }
}

/// Check everything about a single response that can be checked without
/// looking at the other responses.
fn validate_response(
    channel_id: ChannelId,
    response: &ShareResponse,
    secret_id: &SecretId,
    version: Version,
) -> Result<Share, RejectionReason> {
    if response.channel_id != channel_id {
        return Err(RejectionReason::ChannelMismatch);
    }
    if &response.secret_id != secret_id {
        return Err(RejectionReason::SecretIdMismatch);
    }
    if response.version != version {
        return Err(RejectionReason::VersionMismatch {
            expected: version,
            found: response.version,
        });
    }

    let binding = response_binding(
        channel_id,
        secret_id,
        version,
        &response.request_nonce,
        &response.share,
    );
    if binding != response.binding {
        return Err(RejectionReason::BindingMismatch);
    }

    let share =
        Share::from_wire(&response.share).map_err(|err| RejectionReason::Malformed(err.to_string()))?;
    if share.secret_id() != secret_id {
        return Err(RejectionReason::SecretIdMismatch);
    }
    if share.version() != version {
        return Err(RejectionReason::VersionMismatch {
            expected: version,
            found: share.version(),
        });
    }
    if share.shard().x() != channel_point(channel_id) {
        return Err(RejectionReason::WrongChannelPoint);
    }
    if !share.has_valid_signature() {
        return Err(RejectionReason::ForgedSignature);
    }

    Ok(share)
}

fn reject(rejected: &mut Vec<Rejection>, channel_id: ChannelId, reason: RejectionReason) {
    tracing::warn!(channel_id, %reason, "rejected share response");
    rejected.push(Rejection { channel_id, reason });
}

/// Pick the group of shares to recover from. Returns the chosen group's
/// members in channel order.
///
/// A version has exactly one split, so validly signed shares from more than
/// one split always mean a helper is lying. In that case no group is used,
/// whatever threshold each one claims.
fn select_group(
    groups: Vec<(GroupId, Vec<(ChannelId, Share)>)>,
    rejected: &mut Vec<Rejection>,
) -> Result<Vec<(ChannelId, Share)>, Error> {
    if groups.len() > 1 {
        let largest = groups
            .iter()
            .map(|(_, members)| members.len())
            .max()
            .unwrap_or_default();
        let mut largest_groups = groups
            .iter()
            .enumerate()
            .filter(|(_, (_, members))| members.len() == largest)
            .map(|(idx, _)| idx);
        // Only a strictly largest group escapes the blame.
        let spared = match (largest_groups.next(), largest_groups.next()) {
            (Some(idx), None) => Some(idx),
            _ => None,
        };
        let channels = groups
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != spared)
            .flat_map(|(_, (_, members))| members.iter().map(|(channel_id, _)| *channel_id))
            .collect::<Vec<_>>();
        tracing::warn!(
            groups = groups.len(),
            channels = ?channels,
            "share responses belong to different splits"
        );
        return Err(Error::InconsistentShares {
            channels,
            reason: "valid shares belong to different splits of the secret",
        });
    }

    let valid = groups.iter().map(|(_, members)| members.len()).sum::<usize>();
    match groups.into_iter().next() {
        None => Err(Error::InsufficientShares {
            needed: None,
            valid,
            rejected: std::mem::take(rejected),
        }),
        Some((group_id, _)) if valid < group_id.threshold as usize => {
            Err(Error::InsufficientShares {
                needed: Some(group_id.threshold),
                valid,
                rejected: std::mem::take(rejected),
            })
        }
        Some((_, members)) => Ok(members),
    }
}

/// Interpolate the data key from a consistent group and decrypt the secret.
fn combine(members: &[(ChannelId, Share)]) -> Result<Vec<u8>, Error> {
    let channels = || members.iter().map(|(channel_id, _)| *channel_id).collect();

    let shards = members
        .iter()
        .map(|(_, share)| share.shard().clone())
        .collect::<Vec<_>>();
    let secret = match shamir::recover_secret(shards) {
        Ok(secret) => secret,
        Err(ShamirError::InconsistentShards(idxs)) => {
            return Err(Error::InconsistentShares {
                channels: idxs.into_iter().map(|idx| members[idx].0).collect(),
                reason: "share does not lie on the recovered polynomial",
            })
        }
        Err(err) => return Err(err.into()),
    };

    let secret = Zeroizing::new(secret);
    let secret = ShardSecret::from_wire(&secret[..]).map_err(|_| Error::InconsistentShares {
        channels: channels(),
        reason: "recovered key material is malformed",
    })?;

    // Every member carries the same ciphertext and identity.
    let (_, share) = members
        .first()
        .ok_or(Error::InvariantViolation("chosen group must not be empty"))?;
    share.decrypt(&secret).map_err(|_| Error::InconsistentShares {
        channels: channels(),
        reason: "recovered key does not decrypt the secret",
    })
}

/// Recover the secret from helpers' share responses, also reporting which
/// responses were used and which were rejected.
///
/// Every response is checked on its own first (binding, encoding, channel
/// point and signature). The survivors are grouped by the split they claim
/// to belong to. If there is exactly one group and it has enough shares it
/// is used. Shares from more than one split are never resolved by picking a
/// group, and recovery returns `InconsistentShares` instead.
pub fn recover_with_report(
    responses: &BTreeMap<ChannelId, ShareResponse>,
    secret_id: &SecretId,
    version: Version,
) -> Result<Recovery, Error> {
    let mut rejected = vec![];
    let mut groups: Vec<(GroupId, Vec<(ChannelId, Share)>)> = vec![];
    let mut group_index: HashMap<GroupId, usize> = HashMap::new();

    for (&channel_id, response) in responses {
        match validate_response(channel_id, response, secret_id, version) {
            Ok(share) => {
                let group_id = GroupId::from(&share);
                let idx = *group_index.entry(group_id.clone()).or_insert_with(|| {
                    groups.push((group_id, vec![]));
                    groups.len() - 1
                });
                groups[idx].1.push((channel_id, share));
            }
            Err(reason) => reject(&mut rejected, channel_id, reason),
        }
    }

    tracing::debug!(
        responses = responses.len(),
        rejected = rejected.len(),
        groups = groups.len(),
        "validated share responses"
    );

    let members = select_group(groups, &mut rejected)?;
    let secret = combine(&members)?;
    let used = members
        .into_iter()
        .map(|(channel_id, _)| channel_id)
        .collect::<Vec<_>>();

    tracing::debug!(channels = ?used, "recovered secret");

    Ok(Recovery {
        secret,
        used,
        rejected,
    })
}

/// Recover the secret from helpers' share responses.
///
/// See [`recover_with_report`] for how faulty responses are handled.
pub fn recover_from_share_responses(
    responses: &BTreeMap<ChannelId, ShareResponse>,
    secret_id: &SecretId,
    version: Version,
) -> Result<Vec<u8>, Error> {
    recover_with_report(responses, secret_id, version).map(Recovery::into_secret)
}
