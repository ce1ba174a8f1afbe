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

use crate::shamir::{
    gf::{GfElem, GfElemPrimitive, GfPoint, GfPolynomial},
    Error, Shard,
};

use rand::{CryptoRng, RngCore};
use rayon::prelude::*;

/// Holds the random polynomials for a secret and deals `Shard`s from them.
///
/// The constant term of polynomial `i` is the `i`-th four-byte chunk of the
/// secret. A `Dealer` must be dropped once all shards have been dealt, since
/// anyone holding it can trivially read the secret.
pub struct Dealer {
    secret_len: usize,
    threshold: GfElemPrimitive,
    polys: Vec<GfPolynomial>,
}

impl Dealer {
    /// Construct a `Dealer` for a `threshold`-of-n scheme over `secret`.
    pub fn new<B, R>(threshold: u32, secret: B, rng: &mut R) -> Result<Self, Error>
    where
        B: AsRef<[u8]>,
        R: CryptoRng + RngCore + ?Sized,
    {
        if threshold == 0 {
            return Err(Error::InvalidThreshold);
        }

        let secret = secret.as_ref();
        let mut polys = vec![];
        let mut remain = secret;
        while !remain.is_empty() {
            let (chunk, next) = GfElem::from_bytes_partial(remain);
            let mut poly = GfPolynomial::new_rand(threshold - 1, rng);
            poly.set_constant(chunk);
            polys.push(poly);
            remain = next;
        }

        Ok(Self {
            secret_len: secret.len(),
            threshold,
            polys,
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Deal the shard evaluated at `x`.
    ///
    /// Dealing the same `x` twice yields the same shard, so callers must make
    /// sure every holder gets a distinct `x`.
    pub fn shard(&self, x: GfElem) -> Result<Shard, Error> {
        if x == GfElem::ZERO {
            return Err(Error::ZeroPoint);
        }
        Ok(Shard {
            x,
            ys: self.polys.iter().map(|poly| poly.evaluate(x)).collect(),
            secret_len: self.secret_len,
            threshold: self.threshold,
        })
    }

    /// The secret this dealer was constructed from.
    pub fn secret(&self) -> Vec<u8> {
        let mut secret = self
            .polys
            .iter()
            .flat_map(|poly| poly.constant().to_bytes())
            .collect::<Vec<_>>();
        secret.truncate(self.secret_len);
        secret
    }
}

/// Recover the secret from a set of shards.
///
/// The first `threshold` shards are used to interpolate the secret. Every
/// shard after that is checked against the interpolated polynomials, and if
/// any of them disagree `Error::InconsistentShards` lists their positions.
///
/// The positions are relative to the first `threshold` shards, which are
/// trusted as the basis. If a basis shard is the bad one, every surplus shard
/// disagrees and all of them are listed while the culprit is not. Callers
/// that need to identify the culprit can retry with a different ordering.
pub fn recover_secret<S: AsRef<[Shard]>>(shards: S) -> Result<Vec<u8>, Error> {
    let shards = shards.as_ref();
    let first = shards.first().ok_or(Error::NotEnoughShards {
        needed: 1,
        num_shards: 0,
    })?;
    let (threshold, secret_len) = (first.threshold, first.secret_len);

    if shards.iter().any(|s| s.threshold != threshold) {
        return Err(Error::MismatchedShards("threshold differs"));
    }
    if shards.iter().any(|s| s.secret_len != secret_len) {
        return Err(Error::MismatchedShards("secret length differs"));
    }
    if !shards.iter().all(Shard::is_well_formed) {
        return Err(Error::MismatchedShards("shard is malformed"));
    }

    let k = threshold as usize;
    if shards.len() < k {
        return Err(Error::NotEnoughShards {
            needed: k,
            num_shards: shards.len(),
        });
    }
    let (basis, extra) = shards.split_at(k);

    let num_chunks = first.ys.len();
    let points = |i: usize| -> Vec<GfPoint> { basis.iter().map(|s| (s.x, s.ys[i])).collect() };

    let constants = (0..num_chunks)
        .into_par_iter()
        .map(|i| GfPolynomial::lagrange_constant(threshold - 1, points(i)))
        .collect::<Result<Vec<_>, _>>()?;

    // Check the surplus shards. The basis weights only depend on the x values,
    // so compute them once per surplus shard and reuse them for every chunk.
    let basis_xs = basis.iter().map(|s| s.x).collect::<Vec<_>>();
    let mut inconsistent = vec![];
    for (idx, shard) in extra.iter().enumerate() {
        if basis_xs.contains(&shard.x) {
            inconsistent.push(k + idx);
            continue;
        }
        let weights = GfPolynomial::lagrange_weights(&basis_xs, shard.x)?;
        let agrees = (0..num_chunks).into_par_iter().all(|i| {
            let expected = basis
                .iter()
                .zip(&weights)
                .fold(GfElem::ZERO, |acc, (s, w)| acc + s.ys[i] * *w);
            expected == shard.ys[i]
        });
        if !agrees {
            inconsistent.push(k + idx);
        }
    }
    if !inconsistent.is_empty() {
        return Err(Error::InconsistentShards(inconsistent));
    }

    let mut secret = constants
        .iter()
        .flat_map(GfElem::to_bytes)
        .collect::<Vec<_>>();
    secret.truncate(secret_len);
    Ok(secret)
}
