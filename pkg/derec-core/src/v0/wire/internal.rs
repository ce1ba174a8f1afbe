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
    wire::{nom_error, prefixes::*, push_prefixed, push_u32, FromWire, ToWire},
    Error, Identity, ShardSecret,
};

use ed25519_dalek::{Signature, SignatureError, VerifyingKey};

// Internal only -- users can't see Identity.
impl ToWire for Identity {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode ed25519 public key (with multicodec prefix).
        push_u32(&mut bytes, PREFIX_ED25519_PUB);
        bytes.extend_from_slice(self.id_public_key.as_bytes());

        // Encode ed25519 signature (with multicodec prefix).
        push_u32(&mut bytes, PREFIX_ED25519_SIG);
        bytes.extend_from_slice(&self.id_signature.to_bytes());

        bytes
    }
}

type IdentityParseResult = (Result<VerifyingKey, SignatureError>, Signature);

// Internal only -- users can't see Identity.
impl FromWire for Identity {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        use crate::v0::wire::helpers::{take_ed25519_pub, take_ed25519_sig};
        use nom::{combinator::complete, IResult};

        fn parse(input: &[u8]) -> IResult<&[u8], IdentityParseResult> {
            let (input, public_key) = take_ed25519_pub(input)?;
            let (input, signature) = take_ed25519_sig(input)?;

            Ok((input, (public_key, signature)))
        }

        let (input, (public_key, signature)) =
            complete(parse)(input).map_err(nom_error("identity"))?;

        Ok((
            input,
            Identity {
                id_public_key: public_key.map_err(|err| {
                    Error::MalformedMessage(format!("invalid identity public key: {}", err))
                })?,
                id_signature: signature,
            },
        ))
    }
}

// Internal only -- users can't see ShardSecret.
impl ToWire for ShardSecret {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode ChaCha20-Poly1305 key.
        push_prefixed(&mut bytes, PREFIX_CHACHA20POLY1305_KEY, &self.data_key);

        bytes
    }
}

// Internal only -- users can't see ShardSecret.
impl FromWire for ShardSecret {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), Error> {
        use crate::v0::wire::helpers::take_chachapoly_key;
        use nom::combinator::complete;

        let (input, data_key) =
            complete(take_chachapoly_key)(input).map_err(nom_error("shard secret"))?;

        Ok((input, ShardSecret { data_key }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::v0::ChaChaPolyKey;

    use ed25519_dalek::{Signer, SigningKey};
    use rand::{rngs::OsRng, RngCore};

    #[quickcheck]
    fn identity_roundtrip(data: Vec<u8>) -> bool {
        let id_keypair = SigningKey::generate(&mut OsRng);

        let identity = Identity {
            id_public_key: id_keypair.verifying_key(),
            id_signature: id_keypair.sign(&data),
        };
        let identity2 = Identity::from_wire(identity.to_wire()).unwrap();

        identity == identity2
    }

    #[test]
    fn shard_secret_roundtrip() {
        let mut data_key = ChaChaPolyKey::default();
        OsRng.fill_bytes(&mut data_key);

        let secret = ShardSecret { data_key };
        let secret2 = ShardSecret::from_wire(secret.to_wire()).unwrap();

        assert_eq!(secret.data_key, secret2.data_key);
    }

    #[test]
    fn shard_secret_wrong_prefix() {
        let mut bytes = vec![];
        push_prefixed(&mut bytes, PREFIX_CHACHA20POLY1305_NONCE, &[0u8; 32]);
        assert!(matches!(
            ShardSecret::from_wire(bytes),
            Err(Error::MalformedMessage(_))
        ));
    }
}
