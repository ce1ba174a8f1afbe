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
    shamir::Shard,
    v0::{
        wire::{
            nom_error, prefixes::*, push_length_prefixed, push_prefixed, push_u32, push_u64,
            FromWire, ToWire,
        },
        ChaChaPolyNonce, Error, Identity, Share, ShareBuilder, ShareMeta, FORMAT_VERSION,
    },
};

// Internal only -- users can't see ShareMeta.
impl ToWire for ShareMeta {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u32(&mut bytes, self.format_version);
        push_length_prefixed(&mut bytes, self.secret_id.as_bytes());
        push_u32(&mut bytes, self.version);
        push_u32(&mut bytes, self.threshold);

        bytes
    }
}

// Internal only -- users can't see ShareMeta.
impl FromWire for ShareMeta {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        use crate::v0::wire::helpers::take_secret_id;
        use nom::{combinator::complete, IResult};

        fn parse(input: &[u8]) -> IResult<&[u8], ShareMeta> {
            let (input, format_version) = nom_helpers::u32(input)?;
            let (input, secret_id) = take_secret_id(input)?;
            let (input, version) = nom_helpers::u32(input)?;
            let (input, threshold) = nom_helpers::u32(input)?;

            Ok((
                input,
                ShareMeta {
                    format_version,
                    secret_id,
                    version,
                    threshold,
                },
            ))
        }

        complete(parse)(input).map_err(nom_error("share metadata"))
    }
}

// Internal only -- users can't see ShareBuilder.
impl ToWire for ShareBuilder {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = self.meta.to_wire();

        // Encode ChaCha20-Poly1305 nonce.
        push_prefixed(&mut bytes, PREFIX_CHACHA20POLY1305_NONCE, &self.nonce);

        // Encode ChaCha20-Poly1305 ciphertext (length-prefixed).
        push_u64(&mut bytes, PREFIX_CHACHA20POLY1305_CIPHERTEXT);
        push_length_prefixed(&mut bytes, &self.ciphertext);

        // Encode shard data.
        bytes.append(&mut self.shard.to_wire());

        bytes
    }
}

// Internal only -- users can't see ShareBuilder.
impl FromWire for ShareBuilder {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        use crate::v0::wire::helpers::{take_chachapoly_ciphertext, take_chachapoly_nonce};
        use nom::{combinator::complete, IResult};

        fn parse(input: &[u8]) -> IResult<&[u8], (ChaChaPolyNonce, &[u8])> {
            let (input, nonce) = take_chachapoly_nonce(input)?;
            let (input, ciphertext) = take_chachapoly_ciphertext(input)?;

            Ok((input, (nonce, ciphertext)))
        }

        let (input, meta) = ShareMeta::from_wire_partial(input)?;
        let (input, (nonce, ciphertext)) =
            complete(parse)(input).map_err(nom_error("share ciphertext"))?;
        let (input, shard) = Shard::from_wire_partial(input)?;

        Ok((
            input,
            ShareBuilder {
                meta,
                nonce,
                ciphertext: ciphertext.into(),
                shard,
            },
        ))
    }
}

impl ToWire for Share {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        push_u64(&mut bytes, PREFIX_MSG_SHARE);
        bytes.append(&mut self.inner.to_wire());
        bytes.append(&mut self.identity.to_wire());

        bytes
    }
}

impl FromWire for Share {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        use nom::combinator::complete;

        let (input, _) = complete(nom_helpers::u64_tag(PREFIX_MSG_SHARE))(input)
            .map_err(nom_error("share message type"))?;
        let (input, inner) = ShareBuilder::from_wire_partial(input)?;
        let (input, identity) = Identity::from_wire_partial(input)?;

        if inner.meta.format_version != FORMAT_VERSION {
            return Err(Error::MalformedMessage(format!(
                "share format version must be '{}' not '{}'",
                FORMAT_VERSION, inner.meta.format_version
            )));
        }

        if inner.meta.threshold != inner.shard.threshold() {
            return Err(Error::MalformedMessage(
                "share threshold disagrees with its shard".into(),
            ));
        }

        Ok((input, Share { inner, identity }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[quickcheck]
    fn share_meta_roundtrip(meta: ShareMeta) {
        let meta2 = ShareMeta::from_wire(meta.to_wire()).unwrap();
        assert_eq!(meta, meta2);
    }

    #[quickcheck]
    fn share_builder_roundtrip(inner: ShareBuilder) {
        let inner2 = ShareBuilder::from_wire(inner.to_wire()).unwrap();
        assert_eq!(inner, inner2);
    }

    #[quickcheck]
    fn share_roundtrip(share: Share) {
        let share2 = Share::from_wire(share.to_wire()).unwrap();
        assert_eq!(share, share2);
    }

    #[quickcheck]
    fn share_multibase_roundtrip(share: Share) {
        let encoded = share.to_wire_multibase(multibase::Base::Base32Z);
        let share2 = Share::from_wire_multibase(encoded).unwrap();
        assert_eq!(share, share2);
    }

    #[quickcheck]
    fn share_future_format_rejected(share: Share) -> bool {
        let mut share = share;
        share.inner.meta.format_version = 1;
        matches!(
            Share::from_wire(share.to_wire()),
            Err(Error::MalformedMessage(_))
        )
    }

    #[quickcheck]
    fn share_trailing_bytes_rejected(share: Share) -> bool {
        let mut bytes = share.to_wire();
        bytes.push(0);
        Share::from_wire(bytes).is_err()
    }

    #[quickcheck]
    fn share_is_not_a_shard_secret(share: Share) -> bool {
        use crate::v0::ShardSecret;
        ShardSecret::from_wire(share.to_wire()).is_err()
    }
}
