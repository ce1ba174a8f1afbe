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
    nom_helpers,
    shamir::gf::{GfElem, GfElemPrimitive},
    v0::{wire::nom_error, Error, FromWire, ShardId, ToWire},
};

use unsigned_varint::encode as varuint_encode;

/// Piece of a secret which has been sharded with [Shamir Secret Sharing][sss].
///
/// A shard holds one y value per four-byte chunk of the secret, all evaluated
/// at the same (non-zero) x value.
///
/// [sss]: https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Shard {
    pub(crate) x: GfElem,
    pub(crate) ys: Vec<GfElem>,
    pub(crate) secret_len: usize,
    pub(crate) threshold: GfElemPrimitive,
}

impl Shard {
    /// Returns the identifier of this `Shard`, derived from its x value.
    ///
    /// Two shards with the same identifier cannot be used together for secret
    /// recovery.
    pub fn id(&self) -> ShardId {
        multibase::encode(multibase::Base::Base32Z, self.x.to_bytes())
    }

    /// The x value this shard was evaluated at.
    pub fn x(&self) -> GfElem {
        self.x
    }

    /// Returns the number of *unique* sister `Shard`s required to recover the
    /// stored secret.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Length (in bytes) of the secret this shard is a piece of.
    pub fn secret_len(&self) -> usize {
        self.secret_len
    }

    /// Whether the number of y values matches the declared secret length.
    pub(crate) fn is_well_formed(&self) -> bool {
        let chunk = std::mem::size_of::<GfElemPrimitive>();
        self.x != GfElem::ZERO
            && self.threshold > 0
            && self.ys.len() == self.secret_len.div_ceil(chunk)
    }
}

impl ToWire for Shard {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode x-value.
        varuint_encode::u32(self.x.inner(), &mut varuint_encode::u32_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));

        // Encode y-values (length-prefixed).
        varuint_encode::usize(self.ys.len(), &mut varuint_encode::usize_buffer())
            .iter()
            .copied()
            .chain(self.ys.iter().flat_map(|y| {
                varuint_encode::u32(y.inner(), &mut varuint_encode::u32_buffer()).to_owned()
            }))
            .for_each(|b| bytes.push(b));

        // Encode threshold.
        varuint_encode::u32(self.threshold, &mut varuint_encode::u32_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));

        // Encode secret length.
        varuint_encode::usize(self.secret_len, &mut varuint_encode::usize_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));

        bytes
    }
}

impl FromWire for Shard {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        use nom::{combinator::complete, multi::count, IResult};

        fn parse(input: &[u8]) -> IResult<&[u8], Shard> {
            let (input, x) = nom_helpers::u32(input)?;
            let (input, ys_length) = nom_helpers::element_count(input)?;
            let (input, ys) = count(nom_helpers::u32, ys_length)(input)?;
            let (input, threshold) = nom_helpers::u32(input)?;
            let (input, secret_len) = nom_helpers::usize(input)?;

            Ok((
                input,
                Shard {
                    x: GfElem::from_inner(x),
                    ys: ys.into_iter().map(GfElem::from_inner).collect(),
                    secret_len,
                    threshold,
                },
            ))
        }

        let (input, shard) = complete(parse)(input).map_err(nom_error("shard"))?;
        if !shard.is_well_formed() {
            return Err(Error::MalformedMessage(
                "shard x value, threshold or length are inconsistent".into(),
            ));
        }

        Ok((input, shard))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Shard {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let ys: Vec<GfElem> = (0..g.size()).map(|_| GfElem::arbitrary(g)).collect();
        let chunk = std::mem::size_of::<GfElemPrimitive>();
        let secret_len = match ys.len() {
            0 => 0,
            n => n * chunk - (usize::arbitrary(g) % chunk),
        };
        Self {
            x: GfElem::from_inner(u32::arbitrary(g).max(1)),
            ys,
            secret_len,
            threshold: u32::arbitrary(g).max(1),
        }
    }
}
