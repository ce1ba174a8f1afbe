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
    shamir::{Dealer, GfElem},
    v0::{
        ChaChaPolyKey, ChaChaPolyNonce, ChannelId, Error, SecretId, ShardSecret, ShareBuilder,
        ShareMeta, Shares, ToWire, Version, FORMAT_VERSION,
    },
};

use aead::{Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use ed25519_dalek::SigningKey;
use itertools::Itertools;
use multihash_codetable::{Code, MultihashDigest};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use zeroize::Zeroizing;

const CHANNEL_POINT_DOMAIN: &[u8] = b"derec channel point";

/// The x value at which the shard for `channel_id` is evaluated.
///
/// Deriving the point from the channel id means a helper cannot pass off
/// another channel's share as its own during recovery.
pub(crate) fn channel_point(channel_id: ChannelId) -> GfElem {
    let mut counter = 0u32;
    loop {
        let mut input = CHANNEL_POINT_DOMAIN.to_vec();
        input.extend_from_slice(&counter.to_le_bytes());
        input.extend_from_slice(&channel_id.to_le_bytes());

        let hash = Code::Blake2b256.digest(&input);
        let (x, _) = GfElem::from_bytes_partial(hash.digest());
        if x != GfElem::ZERO {
            return x;
        }
        counter += 1;
    }
}

/// Split `secret_data` into one share per channel in `channels`, any
/// `threshold` of which can recover it.
///
/// See [`protect_secret_with_rng`].
pub fn protect_secret(
    secret_id: &SecretId,
    secret_data: &[u8],
    channels: &[ChannelId],
    threshold: u32,
    version: Version,
) -> Result<Shares, Error> {
    protect_secret_with_rng(
        secret_id,
        secret_data,
        channels,
        threshold,
        version,
        &mut OsRng,
    )
}

/// Split `secret_data` into one share per channel in `channels`, using `rng`
/// for every random choice.
///
/// The data is encrypted under a fresh key, and only that key is split
/// between the channels. Every share is signed by a key that exists only for
/// the duration of this call, which lets recovery tell apart shares from
/// different splits (or forgeries).
pub fn protect_secret_with_rng<R: RngCore + CryptoRng>(
    secret_id: &SecretId,
    secret_data: &[u8],
    channels: &[ChannelId],
    threshold: u32,
    version: Version,
    rng: &mut R,
) -> Result<Shares, Error> {
    if secret_data.is_empty() {
        return Err(Error::Configuration("secret data must not be empty".into()));
    }
    if channels.is_empty() {
        return Err(Error::Configuration("at least one channel is required".into()));
    }
    if let Some(channel_id) = channels.iter().duplicates().next() {
        return Err(Error::Configuration(format!(
            "channel {} listed more than once",
            channel_id
        )));
    }
    if threshold == 0 || threshold as usize > channels.len() {
        return Err(Error::Configuration(format!(
            "threshold must be between 1 and {} (the number of channels) but was {}",
            channels.len(),
            threshold
        )));
    }

    let points = channels
        .iter()
        .map(|&channel_id| (channel_id, channel_point(channel_id)))
        .collect::<Vec<_>>();
    if points.iter().map(|(_, x)| x).duplicates().next().is_some() {
        return Err(Error::Configuration(
            "two channels derive the same share point".into(),
        ));
    }

    let id_keypair = SigningKey::generate(rng);
    let id_public_key = id_keypair.verifying_key();

    // Generate key and nonce.
    let mut data_key = ChaChaPolyKey::default();
    rng.fill_bytes(&mut data_key);
    let mut nonce = ChaChaPolyNonce::default();
    rng.fill_bytes(&mut nonce);
    let secret = ShardSecret { data_key };

    let meta = ShareMeta {
        format_version: FORMAT_VERSION,
        secret_id: secret_id.clone(),
        version,
        threshold,
    };

    // Encrypt the contents.
    let aead = ChaCha20Poly1305::new(&secret.data_key);
    let payload = Payload {
        msg: secret_data,
        aad: &meta.aad(&id_public_key),
    };
    let ciphertext = aead
        .encrypt(&nonce, payload)
        .map_err(Error::AeadEncryption)?;

    // Split the key.
    let secret_wire = Zeroizing::new(secret.to_wire());
    let dealer = Dealer::new(threshold, &secret_wire[..], rng)?;

    let shares = points
        .into_iter()
        .map(|(channel_id, x)| {
            let share = ShareBuilder {
                meta: meta.clone(),
                nonce,
                ciphertext: ciphertext.clone(),
                shard: dealer.shard(x)?,
            }
            .sign(&id_keypair);
            Ok((channel_id, share))
        })
        .collect::<Result<Shares, Error>>()?;

    tracing::debug!(
        secret_id = %secret_id,
        version,
        threshold,
        channels = channels.len(),
        "protected secret"
    );

    Ok(shares)
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::v0::{recover::test::recover_shares, FromWire, Share};

    use std::collections::BTreeSet;

    use quickcheck::TestResult;
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    fn secret_id() -> SecretId {
        SecretId::new(b"secret id".to_vec()).unwrap()
    }

    #[test]
    fn channel_point_deterministic() {
        assert_eq!(channel_point(42), channel_point(42));
        assert_ne!(channel_point(1), channel_point(2));
        assert_ne!(channel_point(0), GfElem::ZERO);
    }

    #[quickcheck]
    fn one_share_per_channel(channels: BTreeSet<ChannelId>, seed: u64) -> TestResult {
        if channels.is_empty() {
            return TestResult::discard();
        }
        let channels = channels.into_iter().take(16).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(seed);
        let shares = protect_secret_with_rng(&secret_id(), b"data", &channels, 1, 7, &mut rng)
            .unwrap();

        TestResult::from_bool(
            shares.keys().copied().eq(channels.iter().copied())
                && shares.iter().all(|(&channel_id, share)| {
                    share.shard().x() == channel_point(channel_id)
                        && share.version() == 7
                        && share.secret_id() == &secret_id()
                        && share.has_valid_signature()
                }),
        )
    }

    #[quickcheck]
    fn recover_any_threshold_subset(
        threshold: u8,
        extra: u8,
        secret: Vec<u8>,
        seed: u64,
    ) -> TestResult {
        if secret.is_empty() {
            return TestResult::discard();
        }
        let (threshold, extra) = (1 + threshold as u32 % 8, extra as u32 % 4);
        let channels = (100..100 + (threshold + extra) as u64).collect::<Vec<_>>();

        let mut rng = StdRng::seed_from_u64(seed);
        let shares = protect_secret_with_rng(&secret_id(), &secret, &channels, threshold, 0, &mut rng)
            .unwrap();

        let mut chosen = channels.clone();
        chosen.shuffle(&mut rng);
        chosen.truncate(threshold as usize);

        let subset = chosen
            .iter()
            .map(|channel_id| (*channel_id, shares[channel_id].clone()))
            .collect::<Shares>();
        TestResult::from_bool(recover_shares(subset).unwrap() == secret)
    }

    #[test]
    fn sub_threshold_leaks_nothing() {
        use crate::shamir::recover_secret;

        let mut rng = StdRng::seed_from_u64(1);
        let shares =
            protect_secret_with_rng(&secret_id(), b"hunter2", &[1, 2, 3], 3, 0, &mut rng).unwrap();
        let shards = shares
            .values()
            .map(|share| share.shard().clone())
            .collect::<Vec<_>>();
        let real = recover_secret(&shards).unwrap();

        // Interpolating with one point too few (by lying about the threshold)
        // gives garbage, not the data key.
        let lying = shards[..2]
            .iter()
            .cloned()
            .map(|mut shard| {
                shard.threshold = 2;
                shard
            })
            .collect::<Vec<_>>();
        let wrong = recover_secret(lying).unwrap();
        assert_eq!(real.len(), wrong.len());
        assert_ne!(real[real.len() - 32..], wrong[wrong.len() - 32..]);
    }

    #[test]
    fn shares_are_independent_across_splits() {
        let mut rng = StdRng::seed_from_u64(2);
        let first = protect_secret_with_rng(&secret_id(), b"data", &[1, 2], 2, 1, &mut rng).unwrap();
        let second = protect_secret_with_rng(&secret_id(), b"data", &[1, 2], 2, 1, &mut rng).unwrap();
        assert_ne!(first[&1].to_wire(), second[&1].to_wire());
        assert_ne!(first[&1].id_public_key(), second[&1].id_public_key());
    }

    #[test]
    fn invalid_configuration() {
        let mut rng = StdRng::seed_from_u64(3);
        let id = secret_id();
        let cases: [(&SecretId, &[u8], &[ChannelId], u32); 5] = [
            (&id, &b""[..], &[1, 2][..], 1),
            (&id, &b"data"[..], &[][..], 1),
            (&id, &b"data"[..], &[1, 1][..], 1),
            (&id, &b"data"[..], &[1, 2][..], 0),
            (&id, &b"data"[..], &[1, 2][..], 3),
        ];
        for (secret_id, data, channels, threshold) in cases {
            assert!(matches!(
                protect_secret_with_rng(secret_id, data, channels, threshold, 0, &mut rng),
                Err(Error::Configuration(_))
            ));
        }
    }

    #[test]
    fn shares_survive_the_wire() {
        let mut rng = StdRng::seed_from_u64(4);
        let shares =
            protect_secret_with_rng(&secret_id(), b"data", &[5, 6, 7], 2, 3, &mut rng).unwrap();
        for share in shares.values() {
            assert_eq!(&Share::from_wire(share.to_wire()).unwrap(), share);
        }
    }
}
